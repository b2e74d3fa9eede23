use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use stockroom_core::{AvailabilityId, CategoryId, Entity, ProductId, StoreId};
use stockroom_inventory::{AvailabilityRecord, Store};
use stockroom_products::{Category, Product, ProductCategoryLink};

use super::{IsolationLevel, LedgerError, LedgerStore, LedgerTx};

type LinkKey = (ProductId, CategoryId);

/// Committed state. Every availability row and link key carries the clock
/// value of the commit that last wrote it.
#[derive(Debug, Clone, Default)]
struct Tables {
    clock: u64,
    products: BTreeMap<ProductId, Product>,
    stores: BTreeMap<StoreId, Store>,
    categories: BTreeMap<CategoryId, Category>,
    links: BTreeSet<LinkKey>,
    link_versions: HashMap<LinkKey, u64>,
    availability: BTreeMap<AvailabilityId, (AvailabilityRecord, u64)>,
}

impl Tables {
    fn version_of(&self, key: &ReadKey) -> u64 {
        match key {
            ReadKey::Availability(id) => self.availability.get(id).map(|(_, v)| *v).unwrap_or(0),
            ReadKey::Link(key) => self.link_versions.get(key).copied().unwrap_or(0),
        }
    }

    fn apply(&mut self, write: &Write, version: u64) -> Result<(), LedgerError> {
        match write {
            Write::InsertAvailability(record) => {
                if self.availability.contains_key(&record.id) {
                    return Err(LedgerError::Conflict(format!(
                        "availability {} already exists",
                        record.id
                    )));
                }
                self.availability.insert(record.id, (record.clone(), version));
            }
            Write::UpdateAvailability(record) => match self.availability.get_mut(&record.id) {
                Some(slot) => *slot = (record.clone(), version),
                None => {
                    return Err(LedgerError::Conflict(format!(
                        "availability {} no longer exists",
                        record.id
                    )));
                }
            },
            Write::InsertLink(link) => {
                let key = (link.product_id, link.category_id);
                if !self.links.insert(key) {
                    return Err(LedgerError::Conflict(format!(
                        "product {} is already linked to category {}",
                        link.product_id, link.category_id
                    )));
                }
                self.link_versions.insert(key, version);
            }
            Write::DeleteLink(link) => {
                let key = (link.product_id, link.category_id);
                if !self.links.remove(&key) {
                    return Err(LedgerError::Conflict(format!(
                        "product {} is no longer linked to category {}",
                        link.product_id, link.category_id
                    )));
                }
                self.link_versions.insert(key, version);
            }
        }
        Ok(())
    }
}

fn put<E: Entity>(table: &mut BTreeMap<E::Id, E>, entity: E) {
    table.insert(entity.id(), entity);
}

#[derive(Debug, Default)]
struct Counters {
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
    flushes: AtomicUsize,
    conflicts: AtomicUsize,
}

/// Counters describing what happened to the store since it was created.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct LedgerStats {
    pub commits: usize,
    pub rollbacks: usize,
    pub flushes: usize,
    pub conflicts: usize,
}

#[derive(Debug, Default)]
struct Shared {
    tables: RwLock<Tables>,
    counters: Counters,
}

/// In-memory ledger.
///
/// Intended for tests/dev. Not optimized for performance. Writes are buffered
/// per transaction and become visible to others only at commit.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedgerStore {
    shared: Arc<Shared>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn write_tables(&self) -> Result<std::sync::RwLockWriteGuard<'_, Tables>, LedgerError> {
        self.shared.tables.write().map_err(|_| LedgerError::LockPoisoned)
    }

    fn read_tables(&self) -> Result<std::sync::RwLockReadGuard<'_, Tables>, LedgerError> {
        self.shared.tables.read().map_err(|_| LedgerError::LockPoisoned)
    }

    pub fn seed_product(&self, product: Product) -> Result<(), LedgerError> {
        put(&mut self.write_tables()?.products, product);
        Ok(())
    }

    pub fn seed_store(&self, store: Store) -> Result<(), LedgerError> {
        put(&mut self.write_tables()?.stores, store);
        Ok(())
    }

    pub fn seed_category(&self, category: Category) -> Result<(), LedgerError> {
        put(&mut self.write_tables()?.categories, category);
        Ok(())
    }

    pub fn seed_link(&self, link: ProductCategoryLink) -> Result<(), LedgerError> {
        let mut tables = self.write_tables()?;
        tables.clock += 1;
        let version = tables.clock;
        tables.apply(&Write::InsertLink(link), version)
    }

    pub fn seed_availability(&self, record: AvailabilityRecord) -> Result<(), LedgerError> {
        let mut tables = self.write_tables()?;
        tables.clock += 1;
        let version = tables.clock;
        tables.apply(&Write::InsertAvailability(record), version)
    }

    /// Committed availability of one product, in store order.
    pub fn committed_availability(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<AvailabilityRecord>, LedgerError> {
        let tables = self.read_tables()?;
        let mut rows: Vec<_> = tables
            .availability
            .values()
            .filter(|(r, _)| r.product_id == product_id)
            .map(|(r, _)| r.clone())
            .collect();
        rows.sort_by(stockroom_inventory::allocation_order);
        Ok(rows)
    }

    pub fn committed_availability_count(&self) -> Result<usize, LedgerError> {
        Ok(self.read_tables()?.availability.len())
    }

    pub fn stats(&self) -> LedgerStats {
        let c = &self.shared.counters;
        LedgerStats {
            commits: c.commits.load(Ordering::SeqCst),
            rollbacks: c.rollbacks.load(Ordering::SeqCst),
            flushes: c.flushes.load(Ordering::SeqCst),
            conflicts: c.conflicts.load(Ordering::SeqCst),
        }
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    type Tx = InMemoryTx;

    async fn begin(&self, isolation: IsolationLevel) -> Result<InMemoryTx, LedgerError> {
        Ok(InMemoryTx {
            store: self.clone(),
            isolation,
            read_set: HashMap::new(),
            tracked: HashMap::new(),
            pending: Vec::new(),
            staged: Vec::new(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ReadKey {
    Availability(AvailabilityId),
    Link(LinkKey),
}

#[derive(Debug, Clone)]
enum Write {
    InsertAvailability(AvailabilityRecord),
    UpdateAvailability(AvailabilityRecord),
    InsertLink(ProductCategoryLink),
    DeleteLink(ProductCategoryLink),
}

/// Transaction over an [`InMemoryLedgerStore`].
///
/// `pending` holds writes since the last flush, `staged` the flushed ones.
/// Both are applied together at commit.
#[derive(Debug)]
pub struct InMemoryTx {
    store: InMemoryLedgerStore,
    isolation: IsolationLevel,
    read_set: HashMap<ReadKey, u64>,
    tracked: HashMap<AvailabilityId, AvailabilityRecord>,
    pending: Vec<Write>,
    staged: Vec<Write>,
}

impl InMemoryTx {
    fn own_writes(&self) -> impl Iterator<Item = &Write> {
        self.staged.iter().chain(self.pending.iter())
    }

    fn observe(&mut self, key: ReadKey, version: u64) {
        if self.isolation == IsolationLevel::RepeatableRead {
            self.read_set.entry(key).or_insert(version);
        }
    }

    /// Committed rows matching `filter`, overlaid with this transaction's own
    /// writes and, under repeatable read, with rows it already loaded.
    fn load_availability(
        &mut self,
        filter: impl Fn(&AvailabilityRecord) -> bool,
    ) -> Result<Vec<AvailabilityRecord>, LedgerError> {
        let mut rows: BTreeMap<AvailabilityId, AvailabilityRecord> = BTreeMap::new();
        let mut seen = Vec::new();
        {
            let tables = self.store.read_tables()?;
            for (record, version) in tables.availability.values() {
                if filter(record) {
                    seen.push((record.id, *version));
                    rows.insert(record.id, record.clone());
                }
            }
        }
        for (id, version) in seen {
            self.observe(ReadKey::Availability(id), version);
        }

        if self.isolation == IsolationLevel::RepeatableRead {
            for (id, row) in rows.iter_mut() {
                match self.tracked.get(id) {
                    Some(known) => *row = known.clone(),
                    None => {
                        self.tracked.insert(*id, row.clone());
                    }
                }
            }
        }

        for write in self.own_writes() {
            match write {
                Write::InsertAvailability(r) | Write::UpdateAvailability(r) if filter(r) => {
                    rows.insert(r.id, r.clone());
                }
                _ => {}
            }
        }

        Ok(rows.into_values().collect())
    }

    fn load_links(
        &mut self,
        filter: impl Fn(&LinkKey) -> bool,
    ) -> Result<Vec<ProductCategoryLink>, LedgerError> {
        let mut keys: BTreeSet<LinkKey> = {
            let tables = self.store.read_tables()?;
            tables.links.iter().filter(|k| filter(k)).copied().collect()
        };
        for write in self.own_writes() {
            match write {
                Write::InsertLink(l) if filter(&(l.product_id, l.category_id)) => {
                    keys.insert((l.product_id, l.category_id));
                }
                Write::DeleteLink(l) => {
                    keys.remove(&(l.product_id, l.category_id));
                }
                _ => {}
            }
        }
        Ok(keys
            .into_iter()
            .map(|(p, c)| ProductCategoryLink::new(p, c))
            .collect())
    }

    fn finish(&self, outcome: &Result<(), LedgerError>) {
        let c = &self.store.shared.counters;
        match outcome {
            Ok(()) => c.commits.fetch_add(1, Ordering::SeqCst),
            Err(e) if e.is_conflict() => c.conflicts.fetch_add(1, Ordering::SeqCst),
            Err(_) => 0,
        };
    }
}

#[async_trait]
impl LedgerTx for InMemoryTx {
    async fn product(&mut self, id: ProductId) -> Result<Option<Product>, LedgerError> {
        Ok(self.store.read_tables()?.products.get(&id).cloned())
    }

    async fn products(&mut self) -> Result<Vec<Product>, LedgerError> {
        Ok(self.store.read_tables()?.products.values().cloned().collect())
    }

    async fn products_by_ids(&mut self, ids: &[ProductId]) -> Result<Vec<Product>, LedgerError> {
        let wanted: BTreeSet<&ProductId> = ids.iter().collect();
        let tables = self.store.read_tables()?;
        Ok(wanted
            .into_iter()
            .filter_map(|id| tables.products.get(id).cloned())
            .collect())
    }

    async fn store(&mut self, id: StoreId) -> Result<Option<Store>, LedgerError> {
        Ok(self.store.read_tables()?.stores.get(&id).cloned())
    }

    async fn category(&mut self, id: CategoryId) -> Result<Option<Category>, LedgerError> {
        Ok(self.store.read_tables()?.categories.get(&id).cloned())
    }

    async fn categories(&mut self) -> Result<Vec<Category>, LedgerError> {
        Ok(self.store.read_tables()?.categories.values().cloned().collect())
    }

    async fn link(
        &mut self,
        product_id: ProductId,
        category_id: CategoryId,
    ) -> Result<Option<ProductCategoryLink>, LedgerError> {
        let key = (product_id, category_id);
        let version = self.store.read_tables()?.version_of(&ReadKey::Link(key));
        self.observe(ReadKey::Link(key), version);
        Ok(self.load_links(|k| *k == key)?.into_iter().next())
    }

    async fn links(&mut self) -> Result<Vec<ProductCategoryLink>, LedgerError> {
        self.load_links(|_| true)
    }

    async fn links_in_category(
        &mut self,
        category_id: CategoryId,
    ) -> Result<Vec<ProductCategoryLink>, LedgerError> {
        self.load_links(|(_, c)| *c == category_id)
    }

    async fn insert_link(&mut self, link: ProductCategoryLink) -> Result<(), LedgerError> {
        self.pending.push(Write::InsertLink(link));
        Ok(())
    }

    async fn delete_link(&mut self, link: ProductCategoryLink) -> Result<(), LedgerError> {
        self.pending.push(Write::DeleteLink(link));
        Ok(())
    }

    async fn availability(&mut self) -> Result<Vec<AvailabilityRecord>, LedgerError> {
        self.load_availability(|_| true)
    }

    async fn availability_of(
        &mut self,
        product_id: ProductId,
    ) -> Result<Vec<AvailabilityRecord>, LedgerError> {
        self.load_availability(|r| r.product_id == product_id)
    }

    async fn insert_availability(&mut self, record: AvailabilityRecord) -> Result<(), LedgerError> {
        self.pending.push(Write::InsertAvailability(record));
        Ok(())
    }

    async fn update_availability(&mut self, record: &AvailabilityRecord) -> Result<(), LedgerError> {
        self.tracked.insert(record.id, record.clone());
        self.pending.push(Write::UpdateAvailability(record.clone()));
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), LedgerError> {
        self.staged.append(&mut self.pending);
        self.tracked.clear();
        self.store.shared.counters.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn commit(mut self) -> Result<(), LedgerError> {
        let writes: Vec<Write> = self.staged.drain(..).chain(self.pending.drain(..)).collect();

        let outcome = (|| {
            let mut tables = self.store.write_tables()?;

            for (key, seen) in &self.read_set {
                let current = tables.version_of(key);
                if current != *seen {
                    return Err(LedgerError::Conflict(format!(
                        "{key:?} changed since it was read (read at {seen}, now {current})"
                    )));
                }
            }

            if writes.is_empty() {
                return Ok(());
            }

            // Apply to a copy so a failing write leaves the committed state untouched.
            let mut next = tables.clone();
            next.clock += 1;
            let version = next.clock;
            for write in &writes {
                next.apply(write, version)?;
            }
            *tables = next;
            Ok(())
        })();

        self.finish(&outcome);
        outcome
    }

    async fn rollback(self) -> Result<(), LedgerError> {
        self.store
            .shared
            .counters
            .rollbacks
            .fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
