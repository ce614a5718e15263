use std::fmt;

// =============================================================================
// Joypad Buttons
// =============================================================================

/// NES joypad buttons in the order the connector script expects them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    Up,
    Left,
    Down,
    Right,
    A,
    B,
    Start,
    Select,
}

impl Button {
    pub const ALL: [Button; 8] = [
        Button::Up,
        Button::Left,
        Button::Down,
        Button::Right,
        Button::A,
        Button::B,
        Button::Start,
        Button::Select,
    ];

    pub fn code(self) -> char {
        match self {
            Button::Up => 'u',
            Button::Left => 'l',
            Button::Down => 'd',
            Button::Right => 'r',
            Button::A => 'A',
            Button::B => 'B',
            Button::Start => 't',
            Button::Select => 'e',
        }
    }

    pub fn from_code(code: char) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.code() == code)
    }
}

// =============================================================================
// Wire Commands
// =============================================================================

/// One UDP datagram understood by the emulator-side connector script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `cA<n>`: run `n` frames.
    Advance(u32),
    /// `cV0`: push the current screen on the screen channel.
    RequestScreen,
    /// `cM<block>`: push one 256-byte RAM page on the RAM channel.
    RequestRam(u8),
    /// `cL<slot>`: load a save state.
    LoadState(u8),
    Press(Button),
    Release(Button),
    /// `c<code><value>`: raw control flag, e.g. `cI1` for invincibility.
    Flag { code: char, value: u32 },
    /// `F`: finalize/flush.
    Finalize,
}

impl Command {
    pub fn invincibility(enabled: bool) -> Self {
        Command::Flag {
            code: 'I',
            value: u32::from(enabled),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }

    pub fn parse(text: &str) -> Option<Self> {
        let mut chars = text.chars();
        let prefix = chars.next()?;
        let rest = chars.as_str();
        match prefix {
            'F' if rest.is_empty() => Some(Command::Finalize),
            'p' | 'r' => {
                let mut rest_chars = rest.chars();
                let button = Button::from_code(rest_chars.next()?)?;
                if rest_chars.next().is_some() {
                    return None;
                }
                Some(if prefix == 'p' {
                    Command::Press(button)
                } else {
                    Command::Release(button)
                })
            }
            'c' => {
                let mut rest_chars = rest.chars();
                let code = rest_chars.next()?;
                let operand = rest_chars.as_str();
                match code {
                    'A' => operand.parse().ok().map(Command::Advance),
                    'V' if operand == "0" => Some(Command::RequestScreen),
                    'M' => operand.parse().ok().map(Command::RequestRam),
                    'L' => operand.parse().ok().map(Command::LoadState),
                    _ => operand
                        .parse()
                        .ok()
                        .map(|value| Command::Flag { code, value }),
                }
            }
            _ => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Advance(n) => write!(f, "cA{n}"),
            Command::RequestScreen => f.write_str("cV0"),
            Command::RequestRam(block) => write!(f, "cM{block}"),
            Command::LoadState(slot) => write!(f, "cL{slot}"),
            Command::Press(button) => write!(f, "p{}", button.code()),
            Command::Release(button) => write!(f, "r{}", button.code()),
            Command::Flag { code, value } => write!(f, "c{code}{value}"),
            Command::Finalize => f.write_str("F"),
        }
    }
}
