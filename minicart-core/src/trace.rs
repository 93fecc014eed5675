use crate::bus::{BusEvent, ADDRESS_MASK, HIGH_ADDRESS_MASK, LOW_ADDRESS_BITS, LOW_ADDRESS_MASK};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::{fs, io};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("error serializing/deserializing bus trace: {source}")]
    Serialization {
        #[from]
        source: bincode::Error,
    },
    #[error("error reading/writing bus trace: {source}")]
    FileSystem {
        #[from]
        source: io::Error,
    },
}

/// Step between generated reads. Odd and larger than a page, so every read lands on a new
/// page and the low bits cycle through all values.
const READ_STRIDE: u32 = 0x4C4B;

/// Console address of the selection write for a given sentinel: all page lines high.
pub fn selection_address(sentinel: u32) -> u32 {
    (HIGH_ADDRESS_MASK << LOW_ADDRESS_BITS) | (sentinel & LOW_ADDRESS_MASK)
}

/// An ordered list of console bus operations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusTrace {
    events: Vec<BusEvent>,
}

impl BusTrace {
    pub fn new() -> Self {
        Self::default()
    }

    /// What a menu session looks like on the bus: the menu is read while the controller
    /// settles, the user picks `slot`, the menu writes it and resets the console, and the
    /// console boots the selected image.
    pub fn selection_session(
        settle_delay: u32,
        sentinel: u32,
        slot: u8,
        menu_reads: u32,
        image_reads: u32,
    ) -> Self {
        Self::new()
            .reads(0, menu_reads)
            .idle(settle_delay)
            .select(sentinel, slot)
            .reset()
            .reads(0, image_reads)
    }

    pub fn events(&self) -> &[BusEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<BusEvent> {
        self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn read(mut self, address: u32) -> Self {
        self.events.push(BusEvent::Read { address });
        self
    }

    /// `count` reads starting at `start`, spread across the address space.
    pub fn reads(mut self, start: u32, count: u32) -> Self {
        self.events.extend((0..count).map(|i| BusEvent::Read {
            address: start.wrapping_add(i.wrapping_mul(READ_STRIDE)) & ADDRESS_MASK,
        }));
        self
    }

    pub fn write(mut self, address: u32, value: u8) -> Self {
        self.events.push(BusEvent::Write { address, value });
        self
    }

    pub fn select(self, sentinel: u32, slot: u8) -> Self {
        self.write(selection_address(sentinel), slot)
    }

    pub fn reset(mut self) -> Self {
        self.events.push(BusEvent::Reset);
        self
    }

    pub fn idle(mut self, cycles: u32) -> Self {
        self.events.push(BusEvent::Idle { cycles });
        self
    }
}

impl From<Vec<BusEvent>> for BusTrace {
    fn from(events: Vec<BusEvent>) -> Self {
        Self { events }
    }
}

impl IntoIterator for BusTrace {
    type Item = BusEvent;
    type IntoIter = std::vec::IntoIter<BusEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.into_iter()
    }
}

pub fn save_trace<P>(trace: &BusTrace, path: P) -> Result<(), TraceError>
where
    P: AsRef<Path>,
{
    let serialized_trace = bincode::serialize(trace)?;
    fs::write(path.as_ref(), serialized_trace)?;

    log::info!(
        "Wrote bus trace of {} events to '{}'",
        trace.len(),
        path.as_ref().display()
    );

    Ok(())
}

pub fn load_trace<P>(path: P) -> Result<BusTrace, TraceError>
where
    P: AsRef<Path>,
{
    let serialized_trace = fs::read(path.as_ref())?;
    let trace: BusTrace = bincode::deserialize(&serialized_trace)?;

    log::info!(
        "Loaded bus trace of {} events from '{}'",
        trace.len(),
        path.as_ref().display()
    );

    Ok(trace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_write_hits_top_of_address_space() {
        assert_eq!(0x1FFFFF, selection_address(0x3FF));
        assert_eq!(0x1FFFFE, selection_address(0x3FE));
    }

    #[test]
    fn selection_session_shape() {
        let trace = BusTrace::selection_session(100, 0x3FF, 2, 3, 2);

        assert_eq!(
            &[
                BusEvent::Read { address: 0 },
                BusEvent::Read { address: 0x4C4B },
                BusEvent::Read { address: 0x9896 },
                BusEvent::Idle { cycles: 100 },
                BusEvent::Write {
                    address: 0x1FFFFF,
                    value: 2
                },
                BusEvent::Reset,
                BusEvent::Read { address: 0 },
                BusEvent::Read { address: 0x4C4B },
            ],
            trace.events()
        );
    }

    #[test]
    fn generated_reads_stay_on_the_bus() {
        let trace = BusTrace::new().reads(0x1FFFF0, 1000);

        assert!(trace.events().iter().all(|event| matches!(
            event,
            BusEvent::Read { address } if *address <= ADDRESS_MASK
        )));
    }

    #[test]
    fn save_and_load_file() {
        let path = std::env::temp_dir().join(format!("minicart-trace-{}.bin", std::process::id()));
        let trace = BusTrace::new().read(0x100).select(0x3FF, 4).reset().idle(10);

        save_trace(&trace, &path).unwrap();
        let loaded = load_trace(&path).unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(trace, loaded);
    }

    #[test]
    fn load_missing_file() {
        let path = std::env::temp_dir().join("minicart-trace-does-not-exist.bin");

        assert!(matches!(
            load_trace(path),
            Err(TraceError::FileSystem { .. })
        ));
    }
}
