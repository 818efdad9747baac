//! SHA256d, the doubled SHA-256 hash that identifies every object on the
//! Okapi chain.

use std::io;

use sha2::{Digest, Sha256};

/// `sha256d(x) = sha256(sha256(x))`.
pub fn hash256(data: &[u8]) -> [u8; 32] {
    let pass = Sha256::digest(data);
    let mut output = [0u8; 32];
    output.copy_from_slice(&Sha256::digest(pass));
    output
}

/// An incremental writer that computes the SHA256d of everything written
/// into it, so structures can be hashed while they are serialized.
#[derive(Default)]
pub struct Writer {
    hash: Sha256,
}

impl io::Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.hash.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Writer {
    /// Consume the writer and produce the double hash of its input.
    pub fn finish(self) -> [u8; 32] {
        let pass = self.hash.finalize();
        let mut output = [0u8; 32];
        output.copy_from_slice(&Sha256::digest(pass));
        output
    }
}

/// The first four bytes of a SHA256d, used as the peer-envelope checksum.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Checksum(pub [u8; 4]);

impl<'a> From<&'a [u8]> for Checksum {
    fn from(bytes: &'a [u8]) -> Self {
        let hash = hash256(bytes);
        let mut checksum = [0u8; 4];
        checksum.copy_from_slice(&hash[..4]);
        Checksum(checksum)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn incremental_matches_one_shot() {
        let data = b"okapi test vector";
        let mut writer = Writer::default();
        writer.write_all(&data[..5]).unwrap();
        writer.write_all(&data[5..]).unwrap();
        assert_eq!(writer.finish(), hash256(data));
    }

    #[test]
    fn checksum_is_hash_prefix() {
        let data = b"payload";
        let hash = hash256(data);
        assert_eq!(Checksum::from(&data[..]).0, hash[..4]);
    }

    #[test]
    fn empty_input_vector() {
        // sha256d of the empty string, from the Bitcoin wiki.
        assert_eq!(
            hex::encode(hash256(b"")),
            "5df6e0e2761359d30a8275058e299fcc0381534545f55cf43e41983f5d4c9456"
        );
    }
}
