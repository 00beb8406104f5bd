//! Local input capture → session interactive calls.
//!
//! Translates [`WindowEvent`]s from the message loop into the pointer,
//! key, and scroll calls exposed by [`rvu_core::SessionHandle`]. Pointer
//! coordinates are scaled from window space to the remote frame, and
//! held-button state is tracked across events so every pointer call
//! carries the full button mask.

use rvu_core::{MouseButtons, ScrollAxis};

use crate::window::{MouseBtn, WindowEvent};

/// One marshalled call against the session handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputCall {
    Pointer {
        x: i32,
        y: i32,
        buttons: MouseButtons,
    },
    KeyDown {
        keysym: u32,
        keycode: u32,
    },
    KeyUp {
        keycode: u32,
    },
    Scroll {
        delta: i32,
        axis: ScrollAxis,
    },
}

/// Stateful translator from window events to input calls.
#[derive(Debug, Default)]
pub struct InputTracker {
    buttons: MouseButtons,
    last_pos: (i32, i32),
}

impl InputTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert a window event to a session call (if applicable).
    ///
    /// `window` and `remote` are the current window and remote frame
    /// dimensions used for pointer scaling.
    pub fn translate(
        &mut self,
        event: &WindowEvent,
        window: (u32, u32),
        remote: (u32, u32),
    ) -> Option<InputCall> {
        match event {
            WindowEvent::MouseMove(x, y) => {
                self.last_pos = scale_pointer(*x, *y, window, remote);
                Some(InputCall::Pointer {
                    x: self.last_pos.0,
                    y: self.last_pos.1,
                    buttons: self.buttons,
                })
            }
            WindowEvent::MouseButton(btn, pressed) => {
                let mask = match btn {
                    MouseBtn::Left => MouseButtons::LEFT,
                    MouseBtn::Right => MouseButtons::RIGHT,
                    MouseBtn::Middle => MouseButtons::MIDDLE,
                };
                self.buttons.set(mask, *pressed);
                Some(InputCall::Pointer {
                    x: self.last_pos.0,
                    y: self.last_pos.1,
                    buttons: self.buttons,
                })
            }
            WindowEvent::MouseWheel(delta) => Some(InputCall::Scroll {
                delta: *delta as i32,
                axis: ScrollAxis::Vertical,
            }),
            WindowEvent::Key(vk, scan, pressed) => {
                if *pressed {
                    Some(InputCall::KeyDown {
                        keysym: vk_to_keysym(*vk),
                        keycode: *scan as u32,
                    })
                } else {
                    Some(InputCall::KeyUp {
                        keycode: *scan as u32,
                    })
                }
            }
            WindowEvent::Close | WindowEvent::Resize(..) => None,
        }
    }
}

fn scale_pointer(x: i32, y: i32, window: (u32, u32), remote: (u32, u32)) -> (i32, i32) {
    if window.0 == 0 || window.1 == 0 {
        return (x, y);
    }
    let rx = x as f64 / window.0 as f64 * remote.0 as f64;
    let ry = y as f64 / window.1 as f64 * remote.1 as f64;
    (rx as i32, ry as i32)
}

/// Map a Windows virtual-key code to an X11 keysym.
///
/// Letters and digits map to their ASCII keysyms (letters lowercase, as
/// the shift state travels separately); the common control keys map to
/// their `0xFFxx` counterparts. Unmapped codes pass through unchanged.
pub fn vk_to_keysym(vk: u16) -> u32 {
    match vk {
        // A-Z → lowercase ASCII.
        0x41..=0x5A => vk as u32 + 0x20,
        // 0-9 and space map straight through.
        0x30..=0x39 | 0x20 => vk as u32,
        0x08 => 0xFF08, // Backspace
        0x09 => 0xFF09, // Tab
        0x0D => 0xFF0D, // Return
        0x1B => 0xFF1B, // Escape
        0x2D => 0xFF63, // Insert
        0x2E => 0xFFFF, // Delete
        0x24 => 0xFF50, // Home
        0x23 => 0xFF57, // End
        0x21 => 0xFF55, // Page Up
        0x22 => 0xFF56, // Page Down
        0x25 => 0xFF51, // Left
        0x26 => 0xFF52, // Up
        0x27 => 0xFF53, // Right
        0x28 => 0xFF54, // Down
        0x10 => 0xFFE1, // Shift
        0x11 => 0xFFE3, // Control
        0x12 => 0xFFE9, // Alt
        // F1-F12.
        0x70..=0x7B => 0xFFBE + (vk as u32 - 0x70),
        other => other as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pointer_scales_to_remote_frame() {
        let mut tracker = InputTracker::new();
        let call = tracker
            .translate(&WindowEvent::MouseMove(400, 300), (800, 600), (1600, 1200))
            .unwrap();
        assert_eq!(
            call,
            InputCall::Pointer {
                x: 800,
                y: 600,
                buttons: MouseButtons::empty(),
            }
        );
    }

    #[test]
    fn button_state_is_tracked_across_events() {
        let mut tracker = InputTracker::new();
        let window = (800, 600);
        let remote = (800, 600);

        tracker.translate(&WindowEvent::MouseMove(10, 10), window, remote);
        let press = tracker
            .translate(&WindowEvent::MouseButton(MouseBtn::Left, true), window, remote)
            .unwrap();
        assert_eq!(
            press,
            InputCall::Pointer {
                x: 10,
                y: 10,
                buttons: MouseButtons::LEFT,
            }
        );

        // A move while the button is held keeps the mask.
        let drag = tracker
            .translate(&WindowEvent::MouseMove(20, 20), window, remote)
            .unwrap();
        assert!(matches!(
            drag,
            InputCall::Pointer { buttons, .. } if buttons == MouseButtons::LEFT
        ));

        let release = tracker
            .translate(&WindowEvent::MouseButton(MouseBtn::Left, false), window, remote)
            .unwrap();
        assert!(matches!(
            release,
            InputCall::Pointer { buttons, .. } if buttons.is_empty()
        ));
    }

    #[test]
    fn keysym_mapping() {
        assert_eq!(vk_to_keysym(0x41), 0x61); // A → 'a'
        assert_eq!(vk_to_keysym(0x31), 0x31); // '1'
        assert_eq!(vk_to_keysym(0x0D), 0xFF0D); // Return
        assert_eq!(vk_to_keysym(0x70), 0xFFBE); // F1
        assert_eq!(vk_to_keysym(0x7B), 0xFFC9); // F12
    }

    #[test]
    fn resize_and_close_produce_no_call() {
        let mut tracker = InputTracker::new();
        assert!(tracker
            .translate(&WindowEvent::Close, (800, 600), (800, 600))
            .is_none());
        assert!(tracker
            .translate(&WindowEvent::Resize(100, 100), (800, 600), (800, 600))
            .is_none());
    }
}
