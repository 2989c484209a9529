//! Encryption schemes supported by the voice server's secure RTP negotiation.
use std::num::Wrapping;

use byteorder::{NetworkEndian, WriteBytesExt};
use rand::Rng;
use xsalsa20poly1305::aead::{AeadInPlace, Error as CryptoError};
use xsalsa20poly1305::{Nonce, XSalsa20Poly1305 as Cipher};

use crate::constants::RTP_HEADER_LEN;

/// Length of the Poly1305 authentication tag placed before each encrypted payload.
pub(crate) const TAG_SIZE: usize = 16;

/// Length of an XSalsa20 nonce.
pub(crate) const NONCE_SIZE: usize = 24;

/// Variants of the XSalsa20Poly1305 encryption scheme.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum CryptoMode {
    /// The RTP header is used as the source of nonce bytes for the packet.
    ///
    /// Equivalent to a nonce of at most 48b (6B) at no extra packet overhead:
    /// the RTP sequence number and timestamp are the varying quantities.
    #[default]
    Normal,
    /// An additional random 24B suffix is used as the source of nonce bytes for the packet.
    /// This is regenerated randomly for each packet.
    ///
    /// Full nonce width of 24B (192b), at an extra 24B per packet (~1.2 kB/s).
    Suffix,
    /// An additional random 4B suffix is used as the source of nonce bytes for the packet.
    /// This nonce value increments by `1` with each packet.
    ///
    /// Nonce width of 4B (32b), at an extra 4B per packet (~0.2 kB/s).
    Lite,
}

impl CryptoMode {
    /// Returns the name of a mode as it will appear during negotiation.
    #[must_use]
    pub fn to_request_str(self) -> &'static str {
        match self {
            Self::Normal => "xsalsa20_poly1305",
            Self::Suffix => "xsalsa20_poly1305_suffix",
            Self::Lite => "xsalsa20_poly1305_lite",
        }
    }

    /// Returns the number of bytes each nonce is stored as within a packet.
    #[must_use]
    pub fn nonce_size(self) -> usize {
        match self {
            Self::Normal => RTP_HEADER_LEN,
            Self::Suffix => NONCE_SIZE,
            Self::Lite => 4,
        }
    }

    /// Returns the number of bytes occupied by the encryption scheme which fall before the
    /// payload.
    #[must_use]
    pub fn payload_prefix_len(self) -> usize {
        TAG_SIZE
    }

    /// Returns the number of bytes occupied by the encryption scheme which fall after the
    /// payload.
    #[must_use]
    pub fn payload_suffix_len(self) -> usize {
        match self {
            Self::Normal => 0,
            Self::Suffix | Self::Lite => self.nonce_size(),
        }
    }

    /// Calculates the number of additional bytes required compared to an unencrypted payload.
    #[must_use]
    pub fn payload_overhead(self) -> usize {
        self.payload_prefix_len() + self.payload_suffix_len()
    }

    /// Whether the server offered this mode.
    pub(crate) fn is_offered<T, It>(self, modes: It) -> bool
    where
        T: AsRef<str>,
        It: IntoIterator<Item = T>,
    {
        modes.into_iter().any(|s| s.as_ref() == self.to_request_str())
    }

    /// Extracts the byte slice in a packet used as the nonce, and the remaining mutable
    /// portion of the packet.
    fn nonce_slice<'a>(self, header: &'a [u8], body: &'a mut [u8]) -> (&'a [u8], &'a mut [u8]) {
        match self {
            Self::Normal => (header, body),
            Self::Suffix | Self::Lite => {
                let len = body.len();
                let (body_left, nonce_loc) = body.split_at_mut(len - self.payload_suffix_len());
                (&nonce_loc[..self.nonce_size()], body_left)
            },
        }
    }

    /// Encrypts an RTP packet in place using the given key.
    ///
    /// `packet` must span the RTP header, the tag space, the payload and any nonce suffix
    /// already written by [`CryptoState::write_packet_nonce`].
    #[inline]
    pub(crate) fn encrypt_in_place(self, packet: &mut [u8], cipher: &Cipher) -> Result<(), CryptoError> {
        let (header, body) = packet.split_at_mut(RTP_HEADER_LEN);
        let (slice_to_use, body_remaining) = self.nonce_slice(header, body);

        let mut nonce = Nonce::default();
        let nonce_slice = if slice_to_use.len() == NONCE_SIZE {
            Nonce::from_slice(&slice_to_use[..NONCE_SIZE])
        } else {
            nonce[..self.nonce_size()].copy_from_slice(slice_to_use);
            &nonce
        };

        // The true payload to encrypt follows after the first TAG_SIZE bytes.
        let tag =
            cipher.encrypt_in_place_detached(nonce_slice, b"", &mut body_remaining[TAG_SIZE..])?;
        body_remaining[..TAG_SIZE].copy_from_slice(&tag[..]);

        Ok(())
    }

    /// Decrypts an RTP packet in place, returning the range of the plaintext payload within
    /// the packet.
    #[cfg(test)]
    pub(crate) fn decrypt_in_place(
        self,
        packet: &mut [u8],
        cipher: &Cipher,
    ) -> Result<std::ops::Range<usize>, CryptoError> {
        use xsalsa20poly1305::Tag;

        let packet_len = packet.len();
        let (header, body) = packet.split_at_mut(RTP_HEADER_LEN);
        let (slice_to_use, body_remaining) = self.nonce_slice(header, body);

        let mut nonce = Nonce::default();
        let nonce_slice = if slice_to_use.len() == NONCE_SIZE {
            Nonce::from_slice(&slice_to_use[..NONCE_SIZE])
        } else {
            nonce[..self.nonce_size()].copy_from_slice(slice_to_use);
            &nonce
        };

        let (tag_bytes, data_bytes) = body_remaining.split_at_mut(TAG_SIZE);
        let tag = Tag::from_slice(tag_bytes);

        cipher.decrypt_in_place_detached(nonce_slice, b"", data_bytes, tag)?;

        Ok(RTP_HEADER_LEN + TAG_SIZE..packet_len - self.payload_suffix_len())
    }
}

/// Per-connection nonce state for the negotiated [`CryptoMode`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum CryptoState {
    Normal,
    Suffix,
    Lite(Wrapping<u32>),
}

impl From<CryptoMode> for CryptoState {
    fn from(val: CryptoMode) -> Self {
        match val {
            CryptoMode::Normal => CryptoState::Normal,
            CryptoMode::Suffix => CryptoState::Suffix,
            CryptoMode::Lite => CryptoState::Lite(Wrapping(rand::random::<u32>())),
        }
    }
}

impl CryptoState {
    /// Writes the packet nonce after the payload, if required, returning the new body length.
    ///
    /// `body` is the packet after its RTP header; `payload_end` is the end of tag and payload.
    pub fn write_packet_nonce(&mut self, body: &mut [u8], payload_end: usize) -> usize {
        let mode = self.kind();
        let endpoint = payload_end + mode.payload_suffix_len();

        match self {
            Self::Suffix => {
                rand::thread_rng().fill(&mut body[payload_end..endpoint]);
            },
            Self::Lite(i) => {
                (&mut body[payload_end..endpoint])
                    .write_u32::<NetworkEndian>(i.0)
                    .expect("Nonce size is guaranteed to be sufficient to write u32 for lite tagging.");
                *i += Wrapping(1);
            },
            Self::Normal => {},
        }

        endpoint
    }

    pub fn kind(&self) -> CryptoMode {
        match self {
            Self::Normal => CryptoMode::Normal,
            Self::Suffix => CryptoMode::Suffix,
            Self::Lite(_) => CryptoMode::Lite,
        }
    }
}

#[cfg(test)]
mod tests {
    use xsalsa20poly1305::KeyInit;

    use super::*;

    #[test]
    fn request_strings() {
        assert_eq!(CryptoMode::Normal.to_request_str(), "xsalsa20_poly1305");
        assert_eq!(CryptoMode::Suffix.to_request_str(), "xsalsa20_poly1305_suffix");
        assert_eq!(CryptoMode::Lite.to_request_str(), "xsalsa20_poly1305_lite");
    }

    #[test]
    fn offered_modes() {
        let modes = vec!["xsalsa20_poly1305_lite".to_string(), "aead_aes256_gcm".to_string()];

        assert!(CryptoMode::Lite.is_offered(&modes));
        assert!(!CryptoMode::Normal.is_offered(&modes));
    }

    #[test]
    fn lite_nonce_increments() {
        let mut state = CryptoState::Lite(Wrapping(u32::MAX));
        let mut body = [0u8; 8];

        assert_eq!(state.write_packet_nonce(&mut body, 4), 8);
        assert_eq!(&body[4..], &[0xff; 4]);

        state.write_packet_nonce(&mut body, 4);
        assert_eq!(&body[4..], &[0; 4]);
    }

    #[test]
    fn suffix_round_trip_detects_tampering() {
        let cipher = Cipher::new_from_slice(&[7u8; 32]).unwrap();
        let mode = CryptoMode::Suffix;
        let mut state = CryptoState::from(mode);

        let payload = [1u8, 2, 3, 4];
        let mut packet = vec![0u8; RTP_HEADER_LEN + TAG_SIZE + payload.len() + NONCE_SIZE];
        packet[RTP_HEADER_LEN + TAG_SIZE..RTP_HEADER_LEN + TAG_SIZE + payload.len()]
            .copy_from_slice(&payload);

        let body_len =
            state.write_packet_nonce(&mut packet[RTP_HEADER_LEN..], TAG_SIZE + payload.len());
        assert_eq!(RTP_HEADER_LEN + body_len, packet.len());

        mode.encrypt_in_place(&mut packet, &cipher).unwrap();
        assert_ne!(&packet[RTP_HEADER_LEN + TAG_SIZE..][..4], &payload);

        let mut tampered = packet.clone();
        tampered[RTP_HEADER_LEN + TAG_SIZE] ^= 1;
        assert!(mode.decrypt_in_place(&mut tampered, &cipher).is_err());

        let range = mode.decrypt_in_place(&mut packet, &cipher).unwrap();
        assert_eq!(&packet[range], &payload);
    }
}
