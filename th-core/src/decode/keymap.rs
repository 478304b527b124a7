//! Keycode to character translation
//!
//! Sensors in keyboard mode "type" their readings on a US layout. This
//! module turns the raw key events back into characters, tracking the
//! Shift modifiers so symbols such as `%` come out right.

use crate::constants::input::*;
use crate::hw::KeyEvent;

/// Result of feeding one key event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutput {
    Char(char),
    /// Enter or keypad Enter
    Terminator,
}

/// Stateful translator for one device's key stream
#[derive(Debug, Default)]
pub struct KeyTranslator {
    left_shift: bool,
    right_shift: bool,
}

impl KeyTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    fn shifted(&self) -> bool {
        self.left_shift || self.right_shift
    }

    /// Feed one event; unmapped codes and non-key events yield `None`
    pub fn feed(&mut self, event: KeyEvent) -> Option<KeyOutput> {
        if event.kind != EV_KEY {
            return None;
        }

        match event.code {
            KEY_LEFTSHIFT => {
                self.left_shift = event.value != KEY_RELEASED;
                return None;
            }
            KEY_RIGHTSHIFT => {
                self.right_shift = event.value != KEY_RELEASED;
                return None;
            }
            _ => {}
        }

        // Only fresh presses type a character
        if event.value != KEY_PRESSED {
            return None;
        }

        if event.code == KEY_ENTER || event.code == KEY_KPENTER {
            return Some(KeyOutput::Terminator);
        }

        let ch = if self.shifted() {
            shifted_char(event.code)
        } else {
            plain_char(event.code)
        };
        ch.map(KeyOutput::Char)
    }

    /// Forget modifier state (used when a worker restarts)
    pub fn reset(&mut self) {
        self.left_shift = false;
        self.right_shift = false;
    }
}

const LETTERS: &[(u16, char)] = &[
    (KEY_Q, 'q'), (KEY_W, 'w'), (KEY_E, 'e'), (KEY_R, 'r'), (KEY_T, 't'),
    (KEY_Y, 'y'), (KEY_U, 'u'), (KEY_I, 'i'), (KEY_O, 'o'), (KEY_P, 'p'),
    (KEY_A, 'a'), (KEY_S, 's'), (KEY_D, 'd'), (KEY_F, 'f'), (KEY_G, 'g'),
    (KEY_H, 'h'), (KEY_J, 'j'), (KEY_K, 'k'), (KEY_L, 'l'), (KEY_Z, 'z'),
    (KEY_X, 'x'), (KEY_C, 'c'), (KEY_V, 'v'), (KEY_B, 'b'), (KEY_N, 'n'),
    (KEY_M, 'm'),
];

const DIGIT_SYMBOLS: [char; 10] = ['!', '@', '#', '$', '%', '^', '&', '*', '(', ')'];

fn letter(code: u16) -> Option<char> {
    LETTERS.iter().find(|(c, _)| *c == code).map(|(_, ch)| *ch)
}

fn keypad_char(code: u16) -> Option<char> {
    let ch = match code {
        KEY_KP7 => '7',
        KEY_KP8 => '8',
        KEY_KP9 => '9',
        KEY_KP4 => '4',
        KEY_KP5 => '5',
        KEY_KP6 => '6',
        KEY_KP1 => '1',
        KEY_KP2 => '2',
        KEY_KP3 => '3',
        KEY_KP0 => '0',
        KEY_KPDOT => '.',
        KEY_KPMINUS => '-',
        KEY_KPPLUS => '+',
        KEY_KPASTERISK => '*',
        KEY_KPSLASH => '/',
        _ => return None,
    };
    Some(ch)
}

fn plain_char(code: u16) -> Option<char> {
    if (KEY_1..=KEY_0).contains(&code) {
        // KEY_1..KEY_9 are contiguous, KEY_0 comes last
        let digit = if code == KEY_0 { 0 } else { (code - KEY_1 + 1) as u32 };
        return char::from_digit(digit, 10);
    }
    if let Some(ch) = letter(code) {
        return Some(ch);
    }
    let ch = match code {
        KEY_MINUS => '-',
        KEY_EQUAL => '=',
        KEY_LEFTBRACE => '[',
        KEY_RIGHTBRACE => ']',
        KEY_SEMICOLON => ';',
        KEY_APOSTROPHE => '\'',
        KEY_BACKSLASH => '\\',
        KEY_COMMA => ',',
        KEY_DOT => '.',
        KEY_SLASH => '/',
        KEY_SPACE | KEY_TAB => ' ',
        _ => return keypad_char(code),
    };
    Some(ch)
}

fn shifted_char(code: u16) -> Option<char> {
    if (KEY_1..=KEY_0).contains(&code) {
        return Some(DIGIT_SYMBOLS[(code - KEY_1) as usize]);
    }
    if let Some(ch) = letter(code) {
        return Some(ch.to_ascii_uppercase());
    }
    let ch = match code {
        KEY_MINUS => '_',
        KEY_EQUAL => '+',
        KEY_LEFTBRACE => '{',
        KEY_RIGHTBRACE => '}',
        KEY_SEMICOLON => ':',
        KEY_APOSTROPHE => '"',
        KEY_BACKSLASH => '|',
        KEY_COMMA => '<',
        KEY_DOT => '>',
        KEY_SLASH => '?',
        KEY_SPACE | KEY_TAB => ' ',
        _ => return keypad_char(code),
    };
    Some(ch)
}

/// Key events that type `text` on a US layout, terminated by Enter
///
/// Used by the scripted backend to replay device output.
pub fn key_events_for(text: &str) -> Vec<KeyEvent> {
    let mut events = Vec::new();
    for ch in text.chars() {
        if ch == '\n' {
            events.push(KeyEvent::press(KEY_ENTER));
            events.push(KeyEvent::release(KEY_ENTER));
            continue;
        }
        let Some((code, shift)) = code_for(ch) else {
            continue;
        };
        if shift {
            events.push(KeyEvent::press(KEY_LEFTSHIFT));
        }
        events.push(KeyEvent::press(code));
        events.push(KeyEvent::release(code));
        if shift {
            events.push(KeyEvent::release(KEY_LEFTSHIFT));
        }
    }
    events
}

fn code_for(ch: char) -> Option<(u16, bool)> {
    // Search every non-keypad code for a plain or shifted match
    (KEY_1..=KEY_SPACE).find_map(|code| {
        if plain_char(code) == Some(ch) && keypad_char(code).is_none() && code != KEY_TAB {
            Some((code, false))
        } else if shifted_char(code) == Some(ch) && keypad_char(code).is_none() && code != KEY_TAB {
            Some((code, true))
        } else {
            None
        }
    })
}
