use crc32fast::Hasher;

pub fn calculate_checksum(bytes: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(bytes);
    hasher.finalize()
}

pub fn verify_checksum(bytes: &[u8], expected_checksum: u32) -> bool {
    calculate_checksum(bytes) == expected_checksum
}
