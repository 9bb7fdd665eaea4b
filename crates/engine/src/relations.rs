use domain::{edge_doc_id, ActorId, EdgeKind, Relationship, Result};
use storage::{DocumentStore, Txn, TxnExt};

/// Block edge in either direction, read inside a transaction.
pub(crate) fn blocked_between(txn: &dyn Txn, a: &ActorId, b: &ActorId) -> bool {
    let blocks = EdgeKind::Block.collection();
    txn.exists(blocks, &edge_doc_id(a, b.as_str())) || txn.exists(blocks, &edge_doc_id(b, a.as_str()))
}

/// Pairwise block check. Both directions are read concurrently.
pub async fn is_blocked_between<S: DocumentStore>(store: &S, a: &ActorId, b: &ActorId) -> Result<bool> {
    let blocks = EdgeKind::Block.collection();
    let forward = edge_doc_id(a, b.as_str());
    let backward = edge_doc_id(b, a.as_str());
    let (ab, ba) = futures::try_join!(
        store.exists(blocks, &forward),
        store.exists(blocks, &backward)
    )?;
    Ok(ab || ba)
}

pub async fn relationship<S: DocumentStore>(
    store: &S,
    viewer: &ActorId,
    target: &ActorId,
) -> Result<Relationship> {
    let forward = edge_doc_id(viewer, target.as_str());
    let backward = edge_doc_id(target, viewer.as_str());
    let (following, blocking, blocked_by) = futures::try_join!(
        store.exists(EdgeKind::Follow.collection(), &forward),
        store.exists(EdgeKind::Block.collection(), &forward),
        store.exists(EdgeKind::Block.collection(), &backward)
    )?;
    Ok(Relationship {
        following,
        blocking,
        blocked_by,
    })
}
