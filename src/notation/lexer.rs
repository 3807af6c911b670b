// Tones
// Copyright (C) 2021  Wesley Merkel
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use super::{Bracket, Error, Result};
use crate::pitch::Pitch;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token<'a> {
    pub(crate) kind: TokenKind<'a>,
    pub(crate) offset: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind<'a> {
    Open(Bracket),
    Close(Bracket),
    Pitch(Pitch),
    Rest,
    /// The text between `{` and `}`.
    Properties(&'a str),
}

/// Removes `!` comments and all whitespace.
pub(crate) fn strip(text: &str) -> String {
    text.lines()
        .map(|line| line.split('!').next().unwrap_or(""))
        .flat_map(str::chars)
        .filter(|ch| !ch.is_whitespace())
        .collect()
}

/// Splits stripped notation into tokens.
pub(crate) fn tokenize(text: &str) -> Result<Vec<Token<'_>>> {
    let mut tokens = Vec::new();
    let mut offset = 0;
    while let Some(ch) = text[offset..].chars().next() {
        let (kind, len) = match ch {
            '(' => (TokenKind::Open(Bracket::Paren), 1),
            '[' => (TokenKind::Open(Bracket::Square), 1),
            ')' => (TokenKind::Close(Bracket::Paren), 1),
            ']' => (TokenKind::Close(Bracket::Square), 1),
            '{' => {
                let close = text[offset..]
                    .find('}')
                    .ok_or(Error::Unclosed { offset, open: '{' })?;
                let body = &text[offset + 1..offset + close];
                if let Some(nested) = body.find('{') {
                    return Err(Error::UnknownCharacter {
                        offset: offset + 1 + nested,
                        found: '{',
                    });
                }
                (TokenKind::Properties(body), close + 1)
            }
            '}' => {
                return Err(Error::UnexpectedClose { offset, found: '}' });
            }
            'R' => (TokenKind::Rest, 1),
            'A'..='G' => {
                let (pitch, len) =
                    Pitch::scan(&text[offset..]).ok_or_else(|| invalid_pitch(text, offset))?;
                (TokenKind::Pitch(pitch), len)
            }
            found => return Err(Error::UnknownCharacter { offset, found }),
        };
        tokens.push(Token { kind, offset });
        offset += len;
    }
    Ok(tokens)
}

fn invalid_pitch(text: &str, offset: usize) -> Error {
    let len = text[offset..]
        .char_indices()
        .find(|(i, ch)| *i > 0 && !(ch.is_ascii_digit() || *ch == '#' || "bsx".contains(*ch)))
        .map_or(text.len() - offset, |(i, _)| i);
    Error::InvalidPitch {
        offset,
        name: text[offset..offset + len].to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_comments_and_whitespace() {
        assert_eq!(
            "C4D4(E4){d:1/2}",
            strip("C4 D4 ! the opening\n  ( E4 ) { d : 1 / 2 }\n! nothing here")
        );
    }

    #[test]
    fn split_pitch_runs() {
        let kinds: Vec<_> = tokenize("D3G3Bb2R")
            .unwrap()
            .into_iter()
            .map(|token| (token.kind, token.offset))
            .collect();
        assert_eq!(
            vec![
                (TokenKind::Pitch(Pitch::new(38)), 0),
                (TokenKind::Pitch(Pitch::new(43)), 2),
                (TokenKind::Pitch(Pitch::new(34)), 4),
                (TokenKind::Rest, 7),
            ],
            kinds
        );
    }

    #[test]
    fn properties_are_one_token() {
        let tokens = tokenize("[C]{d:e,v:0.5}").unwrap();
        assert_eq!(4, tokens.len());
        assert_eq!(TokenKind::Properties("d:e,v:0.5"), tokens[3].kind);
        assert_eq!(3, tokens[3].offset);
    }

    #[test]
    fn lexical_errors() {
        assert_eq!(
            Err(Error::UnknownCharacter {
                offset: 2,
                found: 'H'
            }),
            tokenize("C4H4")
        );
        assert_eq!(
            Err(Error::InvalidPitch {
                offset: 0,
                name: "Cb0".to_owned()
            }),
            tokenize("Cb0D")
        );
        assert_eq!(
            Err(Error::Unclosed {
                offset: 2,
                open: '{'
            }),
            tokenize("C4{d:1")
        );
        assert_eq!(
            Err(Error::UnexpectedClose {
                offset: 2,
                found: '}'
            }),
            tokenize("C4}")
        );
    }
}
