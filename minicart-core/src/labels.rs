use thiserror::Error;

/// Longest name the menu can show for a slot.
pub const NAME_MAX: usize = 14;

/// Width of one label record in the menu image, not counting its NUL terminator.
pub const LABEL_WIDTH: usize = 20;
pub const LABEL_RECORD_LEN: usize = LABEL_WIDTH + 1;

/// The menu image ships with placeholder labels starting with this text.
pub const LABEL_MARKER: &[u8] = b"SLOT 1";

/// Characters the menu font has glyphs for.
pub const ALLOWED_CHARS: &str =
    " !#$%&'()*+,-.0123456789:;=?@ABCDEFGHIJKLMNOPQRSTUVWXYZ[]_`abcdefghijklmnopqrstuvwxyz{|}~";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LabelError {
    #[error("slot name must not be empty")]
    Empty,
    #[error("character {ch:?} in slot name {name:?} cannot be shown by the menu")]
    UnsupportedChar { name: String, ch: char },
    #[error("menu image has no slot label table")]
    MarkerNotFound,
    #[error("label table of {len} bytes at offset {offset:#X} runs past the end of the menu image")]
    TableOutOfBounds { offset: usize, len: usize },
}

pub fn is_allowed_char(ch: char) -> bool {
    ALLOWED_CHARS.contains(ch)
}

/// A validated name for one slot in the menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotLabel(String);

impl SlotLabel {
    /// Validate `name`, optionally upper-case it, and cut it to [`NAME_MAX`] characters.
    pub fn new(name: &str, uppercase: bool) -> Result<Self, LabelError> {
        if name.is_empty() {
            return Err(LabelError::Empty);
        }

        if let Some(ch) = name.chars().find(|&ch| !is_allowed_char(ch)) {
            return Err(LabelError::UnsupportedChar {
                name: name.into(),
                ch,
            });
        }

        let name = if uppercase {
            name.to_ascii_uppercase()
        } else {
            name.to_string()
        };

        if name.len() > NAME_MAX {
            log::warn!("slot name {name:?} is longer than {NAME_MAX} characters, truncating");
        }

        Ok(Self(name.chars().take(NAME_MAX).collect()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SlotLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(&self.0)
    }
}

/// One record per user slot: the name padded with spaces, then NUL. Empty slots are all zero
/// so the menu skips them.
pub fn encode_label_table(labels: &[Option<SlotLabel>]) -> Vec<u8> {
    let mut table = Vec::with_capacity(labels.len() * LABEL_RECORD_LEN);

    for label in labels {
        match label {
            Some(label) => {
                let name = label.as_str().as_bytes();
                table.extend_from_slice(name);
                table.resize(table.len() + LABEL_WIDTH - name.len(), b' ');
            }
            None => table.resize(table.len() + LABEL_WIDTH, 0),
        }
        table.push(0);
    }

    table
}

/// Overwrite the placeholder label table in `menu`. Returns the table's offset.
pub fn patch_labels(menu: &mut [u8], labels: &[Option<SlotLabel>]) -> Result<usize, LabelError> {
    let offset = menu
        .windows(LABEL_MARKER.len())
        .position(|window| window == LABEL_MARKER)
        .ok_or(LabelError::MarkerNotFound)?;

    let table = encode_label_table(labels);
    let dest = menu
        .get_mut(offset..offset + table.len())
        .ok_or(LabelError::TableOutOfBounds {
            offset,
            len: table.len(),
        })?;
    dest.copy_from_slice(&table);

    log::debug!("patched {} slot labels at menu offset {offset:#X}", labels.len());

    Ok(offset)
}
