use std::path::Path;

pub const HEADER_GAME_CODE_OFFSET: usize = 0x21AC;
pub const HEADER_GAME_CODE_LEN: usize = 4;
pub const HEADER_TITLE_OFFSET: usize = 0x21B0;
pub const HEADER_TITLE_LEN: usize = 12;

const RESUME_PATCH_FROM: u8 = 0x42;
const RESUME_PATCH_TO: u8 = 0x48;

// Games that hang when resumed from the console's sleep state unless one branch is patched,
// keyed by header game code
const RESUME_PATCHES: &[(&str, usize)] = &[
    ("MACD", 0x4CB7),
    ("MACE", 0x4CB7),
    ("MACF", 0x4CB7),
    ("MACJ", 0x4CB7),
    ("MBRE", 0x419A),
    ("MBRJ", 0x419A),
    ("MLTE", 0x4B18),
    ("MLTJ", 0x4B18),
    ("MRCE", 0x2673),
    ("MRCJ", 0x2673),
    ("MSDE", 0x2A88),
    ("MSDJ", 0x2A88),
    ("MSTJ", 0x4AE3),
    ("MSTP", 0x4B18),
    ("MTAE", 0x2A40),
    ("MTAJ", 0x2A40),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumePatch {
    NotNeeded,
    Applied { offset: usize },
    /// The byte at the patch site was not the expected one, so the image was left alone.
    UnexpectedByte { offset: usize, found: Option<u8> },
}

/// A user ROM image as read from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RomImage {
    file_name: String,
    bytes: Vec<u8>,
}

impl RomImage {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    pub fn from_file<P>(path: P) -> Result<Self, std::io::Error>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
            .to_string();

        Ok(Self { file_name, bytes })
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn game_code(&self) -> Option<String> {
        let code = header_string(&self.bytes, HEADER_GAME_CODE_OFFSET, HEADER_GAME_CODE_LEN)?;
        let code = code.trim();
        (!code.is_empty()).then(|| code.to_string())
    }

    /// Title from the ROM header, only if every character can be shown by the menu.
    pub fn title(&self) -> Option<String> {
        let title = header_string(&self.bytes, HEADER_TITLE_OFFSET, HEADER_TITLE_LEN)?;
        let title = title.trim_end();

        if title.is_empty() || !title.chars().all(crate::labels::is_allowed_char) {
            return None;
        }

        Some(title.to_string())
    }

    /// File name without its extension, with runs of whitespace collapsed.
    pub fn default_name(&self) -> String {
        let stem = Path::new(&self.file_name)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(&self.file_name);

        stem.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    pub fn patch_resume_behavior(&mut self) -> ResumePatch {
        let Some(game_code) = self.game_code() else {
            return ResumePatch::NotNeeded;
        };
        let Some(&(_, offset)) = RESUME_PATCHES.iter().find(|(code, _)| *code == game_code)
        else {
            return ResumePatch::NotNeeded;
        };

        match self.bytes.get_mut(offset) {
            Some(byte) if *byte == RESUME_PATCH_FROM => {
                *byte = RESUME_PATCH_TO;
                log::info!("{game_code}: patched resume behavior at {offset:#X}");
                ResumePatch::Applied { offset }
            }
            found => {
                let found = found.copied();
                log::warn!("{game_code}: unexpected byte {found:02X?} at {offset:#X}, resume patch skipped");
                ResumePatch::UnexpectedByte { offset, found }
            }
        }
    }
}

fn header_string(bytes: &[u8], offset: usize, len: usize) -> Option<String> {
    let field = bytes.get(offset..offset + len)?;
    let end = field.iter().position(|&b| b == 0).unwrap_or(len);

    Some(field[..end].iter().map(|&b| char::from(b)).collect())
}
