//! Small helpers to format internal state for tracing fields.

use std::fmt;

/// Display an `Option<T>` as `None` or the inner value.
pub(crate) struct DisplayOption<'a, T: fmt::Display>(pub &'a Option<T>);

impl<T: fmt::Display> fmt::Display for DisplayOption<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            None => write!(f, "None"),
            Some(x) => x.fmt(f),
        }
    }
}

pub(crate) trait DisplayOptionExt<T: fmt::Display> {
    fn display(&self) -> DisplayOption<'_, T>;
}

impl<T: fmt::Display> DisplayOptionExt<T> for Option<T> {
    fn display(&self) -> DisplayOption<'_, T> {
        DisplayOption(self)
    }
}
