use super::VideoSource;
use crate::error::Result;
use crate::frame::Frame;
use std::ops::{Deref, DerefMut};
use tracing::{debug, warn};

/// A source that has been set up and is released when dropped.
///
/// Opening runs `setup` on the whole chain; if setup fails part-way the chain
/// is released before the error is returned.
pub struct ActiveSource<'a, S: VideoSource + ?Sized> {
    source: &'a mut S,
}

impl<'a, S: VideoSource + ?Sized> ActiveSource<'a, S> {
    pub fn open(source: &'a mut S) -> Result<Self> {
        debug!("Opening {}", source.name());
        if let Err(e) = source.setup() {
            warn!("Setup of {} failed, releasing: {}", source.name(), e);
            source.release();
            return Err(e);
        }
        Ok(Self { source })
    }

    /// Iterate captured frames while the source stays open
    pub fn frames(&mut self) -> Frames<'_, S> {
        frames(&mut *self.source)
    }
}

impl<S: VideoSource + ?Sized> Deref for ActiveSource<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.source
    }
}

impl<S: VideoSource + ?Sized> DerefMut for ActiveSource<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        self.source
    }
}

impl<S: VideoSource + ?Sized> Drop for ActiveSource<'_, S> {
    fn drop(&mut self) {
        debug!("Releasing {}", self.source.name());
        self.source.release();
    }
}

/// Run `f` against a set-up source; the source is released on every exit path
pub fn with_source<S, T, F>(source: &mut S, f: F) -> Result<T>
where
    S: VideoSource + ?Sized,
    F: FnOnce(&mut S) -> Result<T>,
{
    let mut active = ActiveSource::open(source)?;
    f(&mut *active)
}

/// Frame iterator over an already set-up source
pub struct Frames<'a, S: VideoSource + ?Sized> {
    source: &'a mut S,
}

impl<S: VideoSource + ?Sized> Iterator for Frames<'_, S> {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.source.is_open() {
            return None;
        }
        self.source.capture().transpose()
    }
}

/// Iterate frames from `source` until it reports closed or runs dry
pub fn frames<S: VideoSource + ?Sized>(source: &mut S) -> Frames<'_, S> {
    Frames { source }
}
