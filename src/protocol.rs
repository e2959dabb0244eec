//! Pixelflut text protocol parser and response generator.
//!
//! Implements parsing for the Pixelflut commands:
//! - `SIZE`: canvas dimensions
//! - `PX <x> <y>`: read one pixel
//! - `PX <x> <y> <COLOR>`: write one pixel
//! - `HELP`: usage text
//!
//! Commands are matched by case-sensitive prefix and fields are separated by
//! single spaces. The protocol has no error replies, so every `ParseError`
//! is dropped by the caller without answering the client.

use crate::canvas::Pixel;
use bytes::BytesMut;
use std::fmt::Write;
use std::str;
use thiserror::Error;

/// Static usage text returned by `HELP`.
pub const HELP_TEXT: &str = "Welcome to Pixelflut!

Commands:
    HELP                -> get this information page
    SIZE                -> get the size of the canvas
    PX <x> <y>          -> get the color of pixel (x, y)
    PX <x> <y> <COLOR>  -> set the color of pixel (x, y)

    COLOR:
        Grayscale: ww          (\"00\"       black .. \"ff\"       white)
        RGB:       rrggbb      (\"000000\"   black .. \"ffffff\"   white)
        RGBA:      rrggbbaa    (rgb with alpha)

Example:
    \"PX 420 69 ff\\n\"       -> set the color of pixel at (420, 69) to white
    \"PX 420 69 00ffff\\n\"   -> set the color of pixel at (420, 69) to cyan
    \"PX 420 69 ffff007f\\n\" -> set the color of pixel at (420, 69) to yellow with alpha 127
";

/// Color argument of a `PX` write, distinguished by token length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    /// `ww`
    Gray(u8),
    /// `rrggbb`
    Rgb(u8, u8, u8),
    /// `rrggbbaa`
    Rgba(u8, u8, u8, u8),
}

impl Color {
    /// Parse a 2, 6 or 8 digit hex color token.
    pub fn parse(token: &str) -> Result<Self, ParseError> {
        let bytes = token.as_bytes();
        if !bytes.iter().all(u8::is_ascii_hexdigit) {
            return Err(ParseError::InvalidColor(token.to_string()));
        }

        let channel = |i: usize| (hex_value(bytes[i]) << 4) | hex_value(bytes[i + 1]);

        match bytes.len() {
            2 => Ok(Color::Gray(channel(0))),
            6 => Ok(Color::Rgb(channel(0), channel(2), channel(4))),
            8 => Ok(Color::Rgba(channel(0), channel(2), channel(4), channel(6))),
            _ => Err(ParseError::InvalidColor(token.to_string())),
        }
    }

    pub fn to_pixel(self) -> Pixel {
        match self {
            Color::Gray(value) => Pixel::gray(value),
            Color::Rgb(r, g, b) => Pixel::rgb(r, g, b),
            Color::Rgba(r, g, b, a) => Pixel::rgba(r, g, b, a),
        }
    }
}

/// Value of an ASCII hex digit already checked with `is_ascii_hexdigit`
fn hex_value(digit: u8) -> u8 {
    match digit {
        b'0'..=b'9' => digit - b'0',
        b'a'..=b'f' => digit - b'a' + 10,
        _ => digit - b'A' + 10,
    }
}

/// Parsed Pixelflut command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Report canvas dimensions
    Size,
    /// Print usage text
    Help,
    /// Read the presented color of a pixel
    GetPixel { x: i32, y: i32 },
    /// Queue a pixel write
    SetPixel { x: i32, y: i32, color: Color },
}

/// Reasons a line is not a valid command
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("invalid UTF-8 in command")]
    InvalidUtf8,
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("wrong number of fields: {0}")]
    InvalidArity(usize),
    #[error("invalid coordinate: {0}")]
    InvalidCoordinate(String),
    #[error("invalid color: {0}")]
    InvalidColor(String),
}

/// Parser for the Pixelflut text protocol
pub struct Parser;

impl Parser {
    /// Parse one command line, without its line terminator.
    pub fn parse(line: &[u8]) -> Result<Command, ParseError> {
        let line = str::from_utf8(line).map_err(|_| ParseError::InvalidUtf8)?;

        if line.starts_with("PX") {
            Self::parse_px(line)
        } else if line.starts_with("SIZE") {
            Ok(Command::Size)
        } else if line.starts_with("HELP") {
            Ok(Command::Help)
        } else {
            let name = line.split(' ').next().unwrap_or_default();
            Err(ParseError::UnknownCommand(name.to_string()))
        }
    }

    /// Parse `PX <x> <y>` or `PX <x> <y> <COLOR>`
    fn parse_px(line: &str) -> Result<Command, ParseError> {
        let fields: Vec<&str> = line.split(' ').collect();

        match fields.as_slice() {
            [_, x, y] => Ok(Command::GetPixel {
                x: parse_coordinate(x)?,
                y: parse_coordinate(y)?,
            }),
            [_, x, y, color] => Ok(Command::SetPixel {
                x: parse_coordinate(x)?,
                y: parse_coordinate(y)?,
                color: Color::parse(color)?,
            }),
            _ => Err(ParseError::InvalidArity(fields.len())),
        }
    }
}

fn parse_coordinate(field: &str) -> Result<i32, ParseError> {
    field
        .parse::<i32>()
        .map_err(|_| ParseError::InvalidCoordinate(field.to_string()))
}

/// Response generator for the Pixelflut protocol
pub struct Response;

impl Response {
    /// Generate a SIZE response line
    pub fn size(width: u32, height: u32) -> BytesMut {
        let mut response = BytesMut::with_capacity(24);
        // Writing into BytesMut cannot fail
        let _ = writeln!(response, "SIZE {} {}", width, height);
        response
    }

    /// Generate a PX response line; alpha is not echoed
    pub fn pixel(x: i32, y: i32, pixel: Pixel) -> BytesMut {
        let mut response = BytesMut::with_capacity(32);
        let _ = writeln!(
            response,
            "PX {} {} {:02x}{:02x}{:02x}",
            x, y, pixel.r, pixel.g, pixel.b
        );
        response
    }

    /// Generate the HELP response
    pub fn help() -> &'static [u8] {
        HELP_TEXT.as_bytes()
    }
}
