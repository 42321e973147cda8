// SPDX-License-Identifier: PMPL-1.0-or-later
//! Property-based tests for tenant isolation

use std::collections::BTreeSet;
use std::sync::Arc;

use proptest::prelude::*;
use serde_json::json;
use twinstore_adapter::{DocumentAdapter, EmbeddedAdapter, Filter};
use twinstore_repository::Repository;

const TENANTS: [&str; 3] = ["alice", "bob", "carol"];

/// A sequence of writes: (tenant index, id index, delete instead of create)
fn arb_ops() -> impl Strategy<Value = Vec<(usize, u8, bool)>> {
    prop::collection::vec((0..TENANTS.len(), 0u8..6, any::<bool>()), 0..30)
}

proptest! {
    #[test]
    fn test_each_tenant_sees_only_its_own_writes(ops in arb_ops()) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let dir = tempfile::tempdir().unwrap();
            let adapter: Arc<dyn DocumentAdapter> = Arc::new(EmbeddedAdapter::new(dir.path()));
            let repos: Vec<Repository> = TENANTS
                .iter()
                .map(|t| Repository::new(Arc::clone(&adapter), "items").with_tenant(Some(*t)))
                .collect();

            // Model: the set of ids each tenant currently owns.
            let mut model: Vec<BTreeSet<String>> = vec![BTreeSet::new(); TENANTS.len()];
            for (tenant, id, delete) in &ops {
                let id = format!("i{id}");
                let repo = &repos[*tenant];
                if *delete {
                    let removed = repo.delete(&id).await.unwrap();
                    prop_assert_eq!(removed == 1, model[*tenant].remove(&id));
                } else if !model[*tenant].contains(&id) {
                    repo.create(json!({"id": id.clone()}).as_object().cloned().unwrap())
                        .await
                        .unwrap();
                    model[*tenant].insert(id);
                } else {
                    prop_assert_eq!(repo.update(&id, Default::default()).await.unwrap(), 1);
                }
            }

            for (i, repo) in repos.iter().enumerate() {
                prop_assert_eq!(repo.count(&Filter::new()).await.unwrap() as usize, model[i].len());
                for id in 0u8..6 {
                    let id = format!("i{id}");
                    let found = repo.find_by_id_with_user(&id, true).await.unwrap();
                    prop_assert_eq!(found.is_some(), model[i].contains(&id));
                    if let Some(doc) = found {
                        prop_assert_eq!(&doc["userId"], &json!(TENANTS[i]));
                    }
                }
            }

            let total: usize = model.iter().map(BTreeSet::len).sum();
            let unbound = Repository::new(Arc::clone(&adapter), "items");
            prop_assert_eq!(unbound.count(&Filter::new()).await.unwrap() as usize, total);

            Ok(())
        })?;
    }
}
