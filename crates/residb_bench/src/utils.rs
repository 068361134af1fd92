//! Benchmark utilities.

use rand::seq::SliceRandom;
use rand::Rng;
use residb_codec::PropertyKind;
use residb_core::{
    Config, CoreResult, PropertyDef, Record, RecordId, Store, TypeSchema, UniqueConstraint,
};
use residb_storage::InMemoryBlobStore;
use std::sync::Arc;

/// Record type used by every benchmark.
pub const ITEM_TYPE: &str = "Item";

/// Words used to build item names.
const WORDS: &[&str] = &[
    "amber", "birch", "cedar", "delta", "ember", "fjord", "grove", "harbor", "iris", "juniper",
];

/// Schema with one property per index strategy and a unique `sku`.
pub fn item_schema() -> TypeSchema {
    TypeSchema::new(ITEM_TYPE)
        .property(PropertyDef::new("sku", PropertyKind::Text))
        .property(PropertyDef::new("name", PropertyKind::Text))
        .property(PropertyDef::new("price", PropertyKind::Numeric))
        .property(PropertyDef::new("in_stock", PropertyKind::Boolean))
        .property(PropertyDef::new("added", PropertyKind::Temporal))
        .unique(UniqueConstraint::new("sku"))
}

/// A random item with the given unique sku.
pub fn random_item(sku: usize) -> Record {
    let mut rng = rand::thread_rng();
    let name = format!(
        "{} {}",
        WORDS.choose(&mut rng).copied().unwrap_or("plain"),
        WORDS.choose(&mut rng).copied().unwrap_or("item")
    );
    Record::new()
        .with("sku", format!("SKU-{sku:08}"))
        .with("name", name)
        .with("price", rng.gen_range(1..10_000i64))
        .with("in_stock", rng.gen_bool(0.7))
        .with(
            "added",
            format!("2024-{:02}-{:02}", rng.gen_range(1..=12), rng.gen_range(1..=28)),
        )
}

/// A store without persistence, for measuring the in-memory paths.
///
/// # Errors
///
/// Returns the error from opening the store or registering the schema.
pub fn volatile_store() -> CoreResult<Store> {
    let store = Store::open(
        Config::new().persistence_enabled(false),
        Arc::new(InMemoryBlobStore::new()),
    )?;
    store.register(item_schema())?;
    Ok(store)
}

/// A volatile store pre-filled with `count` items; returns their identities.
///
/// # Errors
///
/// Returns the error from opening or filling the store.
pub fn populated_store(count: usize) -> CoreResult<(Store, Vec<RecordId>)> {
    let store = volatile_store()?;
    let ids = store.insert_batch(ITEM_TYPE, (0..count).map(random_item).collect())?;
    Ok((store, ids))
}
