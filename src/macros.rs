#![allow(unused_macros)]

/// Helper macro for reading locked items
///
/// ```rust, ignore
///  let entry = read_lock!(slot).clone();
/// ```
macro_rules! read_lock {
    ($rwlock:expr) => {
        $rwlock.read().expect("Failed to acquire read lock")
    };
}

/// Helper macro for writing to locked items
///
/// ```rust, ignore
///  *write_lock!(slot) = TypeInstEntry::Pending;
/// ```
macro_rules! write_lock {
    ($rwlock:expr) => {
        $rwlock.write().expect("Failed to acquire write lock")
    };
}
