//! The dual-phase result shape returned by every Cache Store operation: an
//! immediately-available cache value, plus a deferred network phase. The two are
//! never collapsed into a single future — the cache value is valid and usable even
//! if the network phase later fails.

use futures::future::BoxFuture;

use crate::error::Result;

pub struct DualPhaseResult<C, N = C> {
    pub cache: C,
    pub network: BoxFuture<'static, Result<N>>,
}
