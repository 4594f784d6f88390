//! Compile-time method descriptors.

use std::fmt;
use std::marker::PhantomData;

use super::MethodPath;

/// A unary method taking `Req` and answering `Resp`.
pub struct UnaryMethod<Req, Resp> {
    path: MethodPath,
    _types: PhantomData<fn(Req) -> Resp>,
}

impl<Req, Resp> UnaryMethod<Req, Resp> {
    pub const fn new(service: &'static str, method: &'static str) -> Self {
        Self {
            path: MethodPath::new(service, method),
            _types: PhantomData,
        }
    }

    #[inline]
    pub const fn path(&self) -> MethodPath {
        self.path
    }
}

/// A server-streaming method taking `Req` and yielding `Resp`s.
pub struct StreamingMethod<Req, Resp> {
    path: MethodPath,
    _types: PhantomData<fn(Req) -> Resp>,
}

impl<Req, Resp> StreamingMethod<Req, Resp> {
    pub const fn new(service: &'static str, method: &'static str) -> Self {
        Self {
            path: MethodPath::new(service, method),
            _types: PhantomData,
        }
    }

    #[inline]
    pub const fn path(&self) -> MethodPath {
        self.path
    }
}

// Manual impls: deriving would require `Req: Copy` and `Resp: Copy`.

impl<Req, Resp> Clone for UnaryMethod<Req, Resp> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<Req, Resp> Copy for UnaryMethod<Req, Resp> {}

impl<Req, Resp> fmt::Debug for UnaryMethod<Req, Resp> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UnaryMethod({})", self.path)
    }
}

impl<Req, Resp> Clone for StreamingMethod<Req, Resp> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<Req, Resp> Copy for StreamingMethod<Req, Resp> {}

impl<Req, Resp> fmt::Debug for StreamingMethod<Req, Resp> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StreamingMethod({})", self.path)
    }
}
