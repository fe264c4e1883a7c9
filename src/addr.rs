/// Transport/family tag carried on the wire and attached to a slot.
///
/// Mirrors the original protocol's numeric constants (`TCP=1`,
/// `UDP_V4=2`, `UDP_V6=3`) so the command wire format stays byte-compatible
/// with what a non-Rust peer of this protocol would expect.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Protocol {
    Tcp = 1,
    UdpV4 = 2,
    UdpV6 = 3,
}

impl Protocol {
    pub fn from_u8(v: u8) -> Option<Protocol> {
        match v {
            1 => Some(Protocol::Tcp),
            2 => Some(Protocol::UdpV4),
            3 => Some(Protocol::UdpV6),
            _ => None,
        }
    }
}
