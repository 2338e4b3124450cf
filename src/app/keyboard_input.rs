use super::types::InputEvent;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Keyboard stand-in for the booth button: SPACE presses the button,
/// `p` prints the live preview, `q`/ESC quits.
pub struct KeyboardInputHandler {
    input_tx: mpsc::UnboundedSender<InputEvent>,
    cancellation_token: CancellationToken,
}

impl KeyboardInputHandler {
    pub fn new(input_tx: mpsc::UnboundedSender<InputEvent>) -> Self {
        Self {
            input_tx,
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Start listening for keyboard input
    pub fn start(&self) {
        info!("Starting keyboard input handler - press SPACE to push the button");

        let input_tx = self.input_tx.clone();
        let cancellation_token = self.cancellation_token.clone();

        task::spawn_blocking(move || {
            if let Err(e) = enable_raw_mode() {
                error!("Failed to enable raw mode for keyboard input: {}", e);
                return;
            }

            debug!("Raw mode enabled - keyboard handler active");

            while !cancellation_token.is_cancelled() {
                match event::poll(Duration::from_millis(100)) {
                    Ok(true) => {
                        let Ok(Event::Key(key_event)) = event::read() else {
                            continue;
                        };
                        if key_event.kind != KeyEventKind::Press {
                            continue;
                        }

                        let Some(input) = map_key(key_event.code) else {
                            debug!("Key pressed: {:?}", key_event.code);
                            continue;
                        };

                        if input_tx.send(input).is_err() {
                            debug!("Input receiver gone, keyboard handler stopping");
                            break;
                        }
                        if input == InputEvent::Quit {
                            info!("Quit key pressed - requesting shutdown");
                            break;
                        }
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!("Error polling for keyboard events: {}", e);
                    }
                }
            }

            if let Err(e) = disable_raw_mode() {
                error!("Failed to disable raw mode: {}", e);
            } else {
                debug!("Raw mode disabled");
            }

            debug!("Keyboard input handler task exited");
        });
    }

    /// Stop the keyboard input handler
    pub async fn stop(&self) {
        info!("Stopping keyboard input handler");
        self.cancellation_token.cancel();

        // Give the task a moment to clean up and disable raw mode
        tokio::time::sleep(Duration::from_millis(200)).await;

        let _ = disable_raw_mode();
    }
}

fn map_key(code: KeyCode) -> Option<InputEvent> {
    match code {
        KeyCode::Char(' ') => Some(InputEvent::ButtonPressed),
        KeyCode::Char('p') => Some(InputEvent::PrintPreview),
        KeyCode::Char('q') | KeyCode::Esc => Some(InputEvent::Quit),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_mapping() {
        assert_eq!(map_key(KeyCode::Char(' ')), Some(InputEvent::ButtonPressed));
        assert_eq!(map_key(KeyCode::Char('p')), Some(InputEvent::PrintPreview));
        assert_eq!(map_key(KeyCode::Esc), Some(InputEvent::Quit));
        assert_eq!(map_key(KeyCode::Char('x')), None);
    }

    #[tokio::test]
    async fn test_keyboard_handler_stop() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let handler = KeyboardInputHandler::new(tx);
        assert!(!handler.cancellation_token.is_cancelled());

        handler.stop().await;
        assert!(handler.cancellation_token.is_cancelled());
    }
}
