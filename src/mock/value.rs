use bytes::Bytes;

pub fn from_string(value: &str) -> Bytes {
    Bytes::copy_from_slice(value.as_bytes())
}

pub fn from_slice(value: &[u8]) -> Bytes {
    Bytes::copy_from_slice(value)
}
