use std::io;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, MouseEventKind};
use ratatui::{backend::CrosstermBackend, Terminal};

use crate::ui;
use crate::App;

pub fn run(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App) -> anyhow::Result<()> {
    loop {
        if app.should_quit {
            return Ok(());
        }

        app.drain_logs();
        app.drain_outcomes();

        terminal.draw(|f| ui::draw(f, app))?;

        // 100ms poll keeps runner results flowing in
        if event::poll(Duration::from_millis(100))? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    if app.confirm.is_some() {
                        handle_confirm_key(app, key);
                    } else {
                        handle_key(app, key);
                    }
                }
                Event::Mouse(mouse) => match mouse.kind {
                    MouseEventKind::ScrollUp => app.scroll_log_up(3),
                    MouseEventKind::ScrollDown => app.scroll_log_down(3),
                    _ => {}
                },
                _ => {}
            }
        }
    }
}

fn handle_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') | KeyCode::Char('Q') => app.quit(),
        KeyCode::Up | KeyCode::Char('k') | KeyCode::Char('K') => app.move_up(),
        KeyCode::Down | KeyCode::Char('j') | KeyCode::Char('J') => app.move_down(),
        KeyCode::Enter => app.activate_selected(),
        KeyCode::Char('c') | KeyCode::Char('C') => app.clear_output(),
        KeyCode::Char('d') | KeyCode::Char('D') => app.request_delete(),
        KeyCode::Char('r') | KeyCode::Char('R') => app.reload(),
        KeyCode::Char('l') | KeyCode::Char('L') => app.toggle_log(),
        _ => {}
    }
}

fn handle_confirm_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Left | KeyCode::Right | KeyCode::Tab | KeyCode::Char('h') | KeyCode::Char('l') => {
            if let Some(dialog) = app.confirm.as_mut() {
                dialog.toggle();
            }
        }
        KeyCode::Char('y') | KeyCode::Char('Y') => {
            if let Some(dialog) = app.confirm.as_mut() {
                dialog.selected = true;
            }
            app.resolve_confirm(true);
        }
        KeyCode::Enter => app.resolve_confirm(true),
        KeyCode::Esc | KeyCode::Char('n') | KeyCode::Char('N') => app.resolve_confirm(false),
        _ => {}
    }
}
