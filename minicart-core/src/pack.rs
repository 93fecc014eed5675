use crate::config::{CartConfig, CartLayout, ConfigError};
use crate::labels::{self, LabelError, SlotLabel};
use crate::rom::{ResumePatch, RomImage};
use crate::store::{ImageStore, SlotError};
use std::fmt::Formatter;
use thiserror::Error;

/// Erased flash.
pub const PAD_BYTE: u8 = 0xFF;

#[derive(Error, Debug)]
pub enum PackError {
    #[error("invalid cartridge configuration: {source}")]
    Config {
        #[from]
        source: ConfigError,
    },
    #[error("boot image of {len:#X} bytes does not fit in a {slot_size:#X} byte slot")]
    BootImageTooLarge { len: usize, slot_size: u32 },
    #[error("single-image layout takes no user ROMs, got {count}")]
    RomsWithSingleLayout { count: usize },
    #[error("error naming {file_name}: {source}")]
    Label {
        file_name: String,
        #[source]
        source: LabelError,
    },
    #[error("error patching slot labels into the menu: {source}")]
    MenuLabels {
        #[from]
        source: LabelError,
    },
    #[error("slot error: {source}")]
    Slot {
        #[from]
        source: SlotError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NameSource {
    /// File name without extension.
    #[default]
    FileName,
    /// ROM header title, falling back to the file name when the header has none.
    Header,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackOptions {
    pub name_source: NameSource,
    pub uppercase: bool,
    pub patch_resume: bool,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self {
            name_source: NameSource::default(),
            uppercase: false,
            patch_resume: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    TooLarge { len: usize },
    DuplicateFileName,
    DuplicateGameCode { game_code: String },
    NoFreeSlot,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooLarge { len } => write!(f, "{len:#X} bytes is larger than a slot"),
            Self::DuplicateFileName => write!(f, "duplicate file name"),
            Self::DuplicateGameCode { game_code } => write!(f, "duplicate game code {game_code}"),
            Self::NoFreeSlot => write!(f, "no free slot left"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedSlot {
    pub slot: u8,
    pub file_name: String,
    pub game_code: Option<String>,
    pub label: SlotLabel,
    pub len: usize,
    pub resume_patch: ResumePatch,
}

/// A store image ready to be written to flash at the image store offset.
#[derive(Debug, Clone)]
pub struct PackedStore {
    pub image: Vec<u8>,
    pub slots: Vec<PackedSlot>,
    pub skipped: Vec<(String, SkipReason)>,
    /// Offset of the label table inside the menu image, for the multi layout.
    pub label_table_offset: Option<usize>,
}

impl std::fmt::Display for PackedStore {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "store image: {:#X} bytes", self.image.len())?;
        for slot in &self.slots {
            writeln!(
                f,
                "  slot {:2}: {:<14} {:#08X} bytes  {}",
                slot.slot,
                slot.label,
                slot.len,
                slot.file_name
            )?;
        }
        for (file_name, reason) in &self.skipped {
            writeln!(f, "  skipped {file_name}: {reason}")?;
        }

        Ok(())
    }
}

/// Lay out `boot_image` in slot 0 and `roms` in the following slots.
///
/// For the multi layout `boot_image` is the menu and gets the slot labels patched in; for the
/// single layout it is the only image and `roms` must be empty. ROMs that are too large, or
/// that repeat an earlier file name or game code, are skipped with a warning.
pub fn pack_store(
    config: &CartConfig,
    boot_image: &[u8],
    roms: Vec<RomImage>,
    options: &PackOptions,
) -> Result<PackedStore, PackError> {
    config.validate()?;
    let store = config.image_store()?;

    if config.layout == CartLayout::Single && !roms.is_empty() {
        return Err(PackError::RomsWithSingleLayout { count: roms.len() });
    }

    let slot_size = store.slot_size() as usize;
    if boot_image.len() > slot_size {
        return Err(PackError::BootImageTooLarge {
            len: boot_image.len(),
            slot_size: store.slot_size(),
        });
    }

    let mut image = vec![PAD_BYTE; store.len() as usize];
    let mut slots: Vec<PackedSlot> = Vec::new();
    let mut skipped = Vec::new();
    let user_slots = store.slot_count() - 1;

    for mut rom in roms {
        let file_name = rom.file_name().to_string();

        if let Some(reason) = skip_reason(&rom, &slots, user_slots, slot_size) {
            log::warn!("skipping {file_name}: {reason}");
            skipped.push((file_name, reason));
            continue;
        }

        let resume_patch = if options.patch_resume {
            rom.patch_resume_behavior()
        } else {
            ResumePatch::NotNeeded
        };

        let label = slot_label(&rom, options).map_err(|source| PackError::Label {
            file_name: file_name.clone(),
            source,
        })?;

        let slot = (slots.len() + 1) as u8;
        let range = store.slot_range(slot)?;
        image[range.start..range.start + rom.len()].copy_from_slice(rom.bytes());

        log::info!("slot {slot}: {label} ({file_name}, {:#X} bytes)", rom.len());

        slots.push(PackedSlot {
            slot,
            file_name,
            game_code: rom.game_code(),
            label,
            len: rom.len(),
            resume_patch,
        });
    }

    let menu_range = store.slot_range(ImageStore::MENU_SLOT)?;
    let menu = &mut image[menu_range.start..menu_range.start + boot_image.len()];
    menu.copy_from_slice(boot_image);

    let label_table_offset = match config.layout {
        CartLayout::Multi => {
            let mut labels = vec![None; user_slots as usize];
            for slot in &slots {
                labels[usize::from(slot.slot) - 1] = Some(slot.label.clone());
            }
            Some(labels::patch_labels(menu, &labels)?)
        }
        CartLayout::Single => None,
    };

    Ok(PackedStore {
        image,
        slots,
        skipped,
        label_table_offset,
    })
}

fn skip_reason(
    rom: &RomImage,
    packed: &[PackedSlot],
    user_slots: u32,
    slot_size: usize,
) -> Option<SkipReason> {
    if rom.len() > slot_size {
        return Some(SkipReason::TooLarge { len: rom.len() });
    }

    let file_name = rom.file_name().to_lowercase();
    if packed
        .iter()
        .any(|slot| slot.file_name.to_lowercase() == file_name)
    {
        return Some(SkipReason::DuplicateFileName);
    }

    if let Some(game_code) = rom.game_code() {
        if packed
            .iter()
            .any(|slot| slot.game_code.as_ref() == Some(&game_code))
        {
            return Some(SkipReason::DuplicateGameCode { game_code });
        }
    }

    if packed.len() >= user_slots as usize {
        return Some(SkipReason::NoFreeSlot);
    }

    None
}

fn slot_label(rom: &RomImage, options: &PackOptions) -> Result<SlotLabel, LabelError> {
    let name = match options.name_source {
        NameSource::Header => rom.title().unwrap_or_else(|| rom.default_name()),
        NameSource::FileName => rom.default_name(),
    };

    SlotLabel::new(&name, options.uppercase)
}
