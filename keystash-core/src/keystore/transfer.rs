//! Copy and move of keys between keystores
//!
//! Both operations go through the [`Keystore`] trait, so either side may be
//! an in-process [`KeystoreInstance`](super::KeystoreInstance) or a
//! [`RemoteKeystore`](super::RemoteKeystore).
//!
//! A move stores into the destination before deleting from the source. The
//! destination write is the commit point: if the source delete then fails,
//! the key is left in both keystores and [`KeystoreError::PartialMove`] is
//! returned. The destination copy is never rolled back.

use super::error::{KeystoreError, KeystoreResult};
use super::Keystore;
use crate::metrics::{record_counter, record_failure, Timer, COPY_OPS, MOVE_OPS};
use tracing::{debug, error, warn};

/// Progress of a move
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveState {
    Start,
    /// Key read from the source
    Loaded,
    /// Key durable in the destination
    CopiedToDst,
    /// Key removed from the source
    DeletedFromSrc,
}

impl MoveState {
    /// Whether the destination write has happened
    pub fn is_committed(self) -> bool {
        matches!(self, MoveState::CopiedToDst | MoveState::DeletedFromSrc)
    }
}

/// Copy `name` from `src` into `dst`. `src` is never modified.
pub fn copy_key(src: &dyn Keystore, name: &str, dst: &dyn Keystore) -> KeystoreResult<()> {
    let timer = Timer::new("copy");
    let result = src
        .load_key_vec(name)
        .and_then(|data| dst.store_key(name, &data));
    timer.stop();

    match &result {
        Ok(()) => {
            record_counter(COPY_OPS, 1);
            debug!(
                key = name,
                from = src.instance_name(),
                to = dst.instance_name(),
                "Copied key"
            );
        }
        Err(e) => {
            record_failure("copy", e.kind());
            warn!(
                key = name,
                from = src.instance_name(),
                to = dst.instance_name(),
                error = %e,
                "Key copy failed"
            );
        }
    }
    result
}

/// Move `name` from `src` into `dst`
pub fn move_key(src: &dyn Keystore, name: &str, dst: &dyn Keystore) -> KeystoreResult<()> {
    let timer = Timer::new("move");
    let mut state = MoveState::Start;
    let result = move_record(src, name, dst, &mut state);
    timer.stop();

    match &result {
        Ok(()) => {
            record_counter(MOVE_OPS, 1);
            debug!(
                key = name,
                from = src.instance_name(),
                to = dst.instance_name(),
                "Moved key"
            );
        }
        Err(e) if state.is_committed() => {
            record_failure("move", e.kind());
            error!(
                key = name,
                from = src.instance_name(),
                to = dst.instance_name(),
                state = ?state,
                error = %e,
                "Key written to destination but still present in source"
            );
        }
        Err(e) => {
            record_failure("move", e.kind());
            warn!(
                key = name,
                from = src.instance_name(),
                to = dst.instance_name(),
                state = ?state,
                error = %e,
                "Key move aborted"
            );
        }
    }
    result
}

fn move_record(
    src: &dyn Keystore,
    name: &str,
    dst: &dyn Keystore,
    state: &mut MoveState,
) -> KeystoreResult<()> {
    let data = src.load_key_vec(name)?;
    *state = MoveState::Loaded;

    dst.store_key(name, &data)?;
    *state = MoveState::CopiedToDst;

    src.delete_key(name)
        .map_err(|e| KeystoreError::PartialMove {
            name: name.to_string(),
            source: Box::new(e),
        })?;
    *state = MoveState::DeletedFromSrc;

    Ok(())
}
