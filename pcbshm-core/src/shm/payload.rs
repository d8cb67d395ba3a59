// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Fixed-capacity region layout.
//!
//! A region is `SHARED_DATA_BUFF_SIZE` bytes. The payload occupies a prefix
//! and the rest of the buffer is zero-filled, so the payload length is the
//! offset of the first zero byte. A payload that itself contains a zero byte
//! is therefore truncated at that byte when recalled from a mapped region.
//! The file backend stores the payload without padding and is not affected.

use crate::error::{ShmError, ShmResult};

/// Capacity of every shared region in bytes.
pub const SHARED_DATA_BUFF_SIZE: usize = 1024;

/// Reject payloads that cannot fit in a region.
pub fn validate_for_write(payload: &[u8]) -> ShmResult<()> {
    if payload.len() > SHARED_DATA_BUFF_SIZE {
        return Err(ShmError::PayloadTooLarge {
            size: payload.len(),
            max: SHARED_DATA_BUFF_SIZE,
        });
    }
    Ok(())
}

/// Write `payload` at the start of `region` and zero the remainder.
///
/// Callers validate the payload first; `region` is the whole mapped buffer.
pub fn encode_into(region: &mut [u8], payload: &[u8]) {
    let (head, tail) = region.split_at_mut(payload.len());
    head.copy_from_slice(payload);
    tail.fill(0);
}

/// Length of the payload stored in `region`.
///
/// A buffer without any zero byte holds a payload of exactly the capacity.
pub fn payload_len(region: &[u8]) -> usize {
    region
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(region.len())
}

/// Copy the payload out of `region`.
pub fn decode_from(region: &[u8]) -> Vec<u8> {
    region[..payload_len(region)].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_validation() {
        assert!(validate_for_write(&[]).is_ok());
        assert!(validate_for_write(&[b'x'; SHARED_DATA_BUFF_SIZE]).is_ok());
        assert!(matches!(
            validate_for_write(&[b'x'; SHARED_DATA_BUFF_SIZE + 1]),
            Err(ShmError::PayloadTooLarge {
                size: 1025,
                max: 1024
            })
        ));
    }

    #[test]
    fn test_encode_zero_fills_stale_bytes() {
        let mut region = [0u8; SHARED_DATA_BUFF_SIZE];
        encode_into(&mut region, &[b'A'; 100]);
        encode_into(&mut region, b"short");

        assert_eq!(&region[..5], b"short");
        assert!(region[5..].iter().all(|&b| b == 0));
        assert_eq!(decode_from(&region), b"short");
    }

    #[test]
    fn test_full_capacity_payload() {
        let mut region = [0u8; SHARED_DATA_BUFF_SIZE];
        let payload = vec![b'z'; SHARED_DATA_BUFF_SIZE];
        encode_into(&mut region, &payload);

        assert_eq!(payload_len(&region), SHARED_DATA_BUFF_SIZE);
        assert_eq!(decode_from(&region), payload);
    }

    #[test]
    fn test_embedded_zero_truncates() {
        let mut region = [0u8; SHARED_DATA_BUFF_SIZE];
        encode_into(&mut region, b"abc\0def");

        assert_eq!(decode_from(&region), b"abc");
    }

    #[test]
    fn test_empty_region() {
        let region = [0u8; SHARED_DATA_BUFF_SIZE];
        assert!(decode_from(&region).is_empty());
    }
}
