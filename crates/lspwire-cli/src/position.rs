//! Text search to protocol positions.

use lsp_types::Position;

/// Where the returned position sits relative to the match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Anchor {
    /// On the first character of the match.
    Start,
    /// Just past the last character of the match.
    End,
}

/// Locates the first occurrence of `needle` in `text`.
///
/// Lines are zero-based and split on `\n`; the character offset counts UTF-16
/// code units from the start of the line, as the protocol requires.
pub(crate) fn find_position(text: &str, needle: &str, anchor: Anchor) -> Option<Position> {
    let start = text.find(needle)?;
    let offset = match anchor {
        Anchor::Start => start,
        Anchor::End => start + needle.len(),
    };
    let before = text.get(..offset)?;
    let line_start = before.rfind('\n').map_or(0, |newline| newline + 1);
    let line = before.matches('\n').count();
    let character = before.get(line_start..)?.encode_utf16().count();

    Some(Position::new(
        u32::try_from(line).ok()?,
        u32::try_from(character).ok()?,
    ))
}
