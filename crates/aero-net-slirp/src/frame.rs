use core::fmt;

/// Largest frame the SLiRP glue will carry in either direction.
///
/// Matches the fixed packet buffer the stack's output path has always used; this comfortably
/// covers a 1514-byte Ethernet frame plus VLAN tag.
pub const MAX_FRAME_LEN: usize = 2000;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub const BROADCAST: Self = Self([0xff; 6]);
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl From<[u8; 6]> for MacAddr {
    fn from(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }
}

/// A raw Ethernet frame owned by the frame queue.
///
/// Frames are immutable once built and always satisfy `0 < len <= max_len` for the limit they were
/// validated against.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame(Box<[u8]>);

impl Frame {
    /// Copy `bytes` into a new frame, rejecting empty or oversized payloads.
    pub fn copy_from(bytes: &[u8], max_len: usize) -> Option<Self> {
        if !is_valid_len(bytes.len(), max_len) {
            return None;
        }
        Some(Self(bytes.into()))
    }

    /// Take ownership of `bytes` without copying, with the same validation as
    /// [`Frame::copy_from`].
    pub fn from_vec(bytes: Vec<u8>, max_len: usize) -> Option<Self> {
        if !is_valid_len(bytes.len(), max_len) {
            return None;
        }
        Some(Self(bytes.into_boxed_slice()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0.into_vec()
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame").field("len", &self.0.len()).finish()
    }
}

pub(crate) fn is_valid_len(len: usize, max_len: usize) -> bool {
    len > 0 && len <= max_len
}
