/// Opaque identifier epoll hands back in `epoll_event.u64` to say which
/// registered source became ready. The reactor uses the socket's slot id as
/// the token, so no separate token-to-slot table is needed.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Token(pub usize);

impl From<usize> for Token {
    #[inline]
    fn from(val: usize) -> Token {
        Token(val)
    }
}

impl From<Token> for usize {
    #[inline]
    fn from(val: Token) -> usize {
        val.0
    }
}
