//! Intel HEX encoding of memory maps.

use ihex::Record;

use super::FlashError;
use crate::memory::SparseMemoryMap;

/// Number of data bytes per data record when encoding.
const RECORD_DATA_LENGTH: usize = 16;

/// Decodes Intel HEX text into a memory map.
///
/// Consecutive data records are joined into a single block. Two data records covering
/// the same address make the whole image invalid.
pub fn decode(text: &str) -> Result<SparseMemoryMap, FlashError> {
    let mut base_address: u64 = 0;
    let mut map = SparseMemoryMap::new();

    for record in ihex::Reader::new(text) {
        let record = record?;
        match record {
            Record::Data { offset, value } => {
                map.add_block(base_address + offset as u64, value)?;
            }
            Record::ExtendedSegmentAddress(address) => {
                base_address = (address as u64) * 16;
            }
            Record::ExtendedLinearAddress(address) => {
                base_address = (address as u64) << 16;
            }
            Record::EndOfFile
            | Record::StartSegmentAddress { .. }
            | Record::StartLinearAddress(_) => (),
        };
    }

    tracing::debug!(
        "Decoded {} bytes in {} blocks from Intel HEX",
        map.byte_len(),
        map.len()
    );
    Ok(map.join())
}

/// Encodes a memory map as Intel HEX text.
///
/// Data records never cross a 64 KiB boundary; an extended linear address record is
/// emitted whenever the upper half of the address changes.
pub fn encode(map: &SparseMemoryMap) -> Result<String, FlashError> {
    let mut records = vec![];
    let mut current_upper: Option<u16> = None;

    for (address, data) in map.blocks() {
        let mut offset = 0;
        while offset < data.len() {
            let running_address = address + offset as u64;
            let address_msbs: u16 = (running_address >> 16)
                .try_into()
                .map_err(|_| FlashError::InvalidHexAddress {
                    address: running_address,
                })?;

            if current_upper != Some(address_msbs) {
                records.push(Record::ExtendedLinearAddress(address_msbs));
                current_upper = Some(address_msbs);
            }

            let to_boundary = 0x1_0000 - (running_address & 0xFFFF) as usize;
            let length = RECORD_DATA_LENGTH
                .min(to_boundary)
                .min(data.len() - offset);

            records.push(Record::Data {
                offset: (running_address & 0xFFFF) as u16,
                value: data[offset..offset + length].to_vec(),
            });
            offset += length;
        }
    }
    records.push(Record::EndOfFile);

    Ok(ihex::create_object_file_representation(&records)?)
}
