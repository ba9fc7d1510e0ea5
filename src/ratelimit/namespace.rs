//! Namespace key handling.

use std::borrow::Cow;

/// A value that can identify a rate limit bucket.
///
/// Returning `None` means "no namespace": the call is not rate limited and
/// touches no state. Empty strings, `None` and numeric zero all map to `None`.
pub trait AsNamespace {
    /// Get the bucket key for this value, if any.
    fn as_namespace(&self) -> Option<Cow<'_, str>>;
}

impl AsNamespace for str {
    fn as_namespace(&self) -> Option<Cow<'_, str>> {
        if self.is_empty() {
            None
        } else {
            Some(Cow::Borrowed(self))
        }
    }
}

impl AsNamespace for String {
    fn as_namespace(&self) -> Option<Cow<'_, str>> {
        self.as_str().as_namespace()
    }
}

impl AsNamespace for Cow<'_, str> {
    fn as_namespace(&self) -> Option<Cow<'_, str>> {
        self.as_ref().as_namespace()
    }
}

impl<T: AsNamespace> AsNamespace for Option<T> {
    fn as_namespace(&self) -> Option<Cow<'_, str>> {
        self.as_ref().and_then(|value| value.as_namespace())
    }
}

impl<T: AsNamespace + ?Sized> AsNamespace for &T {
    fn as_namespace(&self) -> Option<Cow<'_, str>> {
        (**self).as_namespace()
    }
}

macro_rules! impl_integer_namespace {
    ($($ty:ty),*) => {
        $(
            impl AsNamespace for $ty {
                fn as_namespace(&self) -> Option<Cow<'_, str>> {
                    if *self == 0 {
                        None
                    } else {
                        Some(Cow::Owned(self.to_string()))
                    }
                }
            }
        )*
    };
}

impl_integer_namespace!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize);
