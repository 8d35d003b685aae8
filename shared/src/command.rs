/*!
Outgoing HMI commands.

The panel takes ASCII assignments to its text components, each followed by
three `0xFF` bytes:

```text
t2.txt="2.000" FF FF FF
```
*/

use crate::protocol::COMMAND_TERMINATOR;

/// Text components on the panel and the value each one shows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayField {
    Distance,
    SideLength,
    Current,
    Power,
    MaxPower,
}

impl DisplayField {
    /// Every field, in panel order
    pub const ALL: [DisplayField; 5] = [
        DisplayField::Distance,
        DisplayField::SideLength,
        DisplayField::Current,
        DisplayField::Power,
        DisplayField::MaxPower,
    ];

    /// Component name on the panel
    pub fn token(self) -> &'static str {
        match self {
            DisplayField::Distance => "t0.txt",
            DisplayField::SideLength => "t1.txt",
            DisplayField::Current => "t2.txt",
            DisplayField::Power => "t3.txt",
            DisplayField::MaxPower => "t4.txt",
        }
    }
}

/// The ASCII part of a command, `name="value"` with three decimals
pub fn command_text(name: &str, value: f32) -> String {
    format!("{}=\"{:.3}\"", name, value)
}

/// A complete command: text followed by the terminator
pub fn format_command(name: &str, value: f32) -> Vec<u8> {
    let text = command_text(name, value);
    let mut bytes = Vec::with_capacity(text.len() + COMMAND_TERMINATOR.len());
    bytes.extend_from_slice(text.as_bytes());
    bytes.extend_from_slice(&COMMAND_TERMINATOR);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_command_literal() {
        let mut expected = b"t2.txt=\"2.000\"".to_vec();
        expected.extend_from_slice(&[0xFF, 0xFF, 0xFF]);
        assert_eq!(format_command("t2.txt", 2.0), expected);
    }

    #[test]
    fn test_three_decimals() {
        assert_eq!(command_text("t4.txt", 0.0), "t4.txt=\"0.000\"");
        assert_eq!(command_text("t3.txt", 12.3456), "t3.txt=\"12.346\"");
        assert_eq!(command_text("t2.txt", -0.5), "t2.txt=\"-0.500\"");
        assert_eq!(command_text("t0.txt", 1234.0), "t0.txt=\"1234.000\"");
    }

    #[test]
    fn test_field_tokens() {
        let tokens: Vec<_> = DisplayField::ALL.iter().map(|f| f.token()).collect();
        assert_eq!(tokens, ["t0.txt", "t1.txt", "t2.txt", "t3.txt", "t4.txt"]);
    }
}
