mod timer;
pub(crate) use timer::ScopedTimer;
