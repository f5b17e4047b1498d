//! Reference data the core reads: branches, stations, sellables, parties.

use common::{BatchId, BranchId, ClientId, Money, SalesPersonId, SellableId, StationId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, Result};
use crate::store::Transaction;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub id: BranchId,
    pub name: String,
    pub is_active: bool,
}

impl Branch {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: BranchId::new(),
            name: name.into(),
            is_active: true,
        }
    }
}

/// A workstation. Tills are opened per station.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Station {
    pub id: StationId,
    pub branch_id: BranchId,
    pub name: String,
    pub is_active: bool,
}

impl Station {
    pub fn new(branch_id: BranchId, name: impl Into<String>) -> Self {
        Self {
            id: StationId::new(),
            branch_id,
            name: name.into(),
            is_active: true,
        }
    }
}

/// Physical-goods facet of a sellable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Storable {
    /// Stock of this product is tracked per batch.
    pub is_batch: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sellable {
    pub id: SellableId,
    pub code: String,
    pub description: String,
    pub price: Money,
    pub manage_stock: bool,
    pub storable: Option<Storable>,
}

impl Sellable {
    /// A stock-managed product.
    pub fn product(code: impl Into<String>, description: impl Into<String>, price: Money) -> Self {
        Self {
            id: SellableId::new(),
            code: code.into(),
            description: description.into(),
            price,
            manage_stock: true,
            storable: Some(Storable { is_batch: false }),
        }
    }

    /// A stock-managed product tracked per batch.
    pub fn batch_product(
        code: impl Into<String>,
        description: impl Into<String>,
        price: Money,
    ) -> Self {
        Self {
            storable: Some(Storable { is_batch: true }),
            ..Self::product(code, description, price)
        }
    }

    /// A service: never touches stock.
    pub fn service(code: impl Into<String>, description: impl Into<String>, price: Money) -> Self {
        Self {
            id: SellableId::new(),
            code: code.into(),
            description: description.into(),
            price,
            manage_stock: false,
            storable: None,
        }
    }

    /// Storable facet of a stock-managed sellable, `None` for the rest.
    ///
    /// A stock-managed sellable without the facet is an inconsistency.
    pub fn managed_storable(&self) -> Result<Option<Storable>> {
        match (self.manage_stock, self.storable) {
            (false, _) => Ok(None),
            (true, Some(storable)) => Ok(Some(storable)),
            (true, None) => Err(DomainError::DatabaseInconsistency(format!(
                "sellable {} manages stock but has no storable",
                self.code
            ))),
        }
    }

    pub fn requires_batch(&self) -> Result<bool> {
        Ok(self.managed_storable()?.is_some_and(|s| s.is_batch))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub id: BatchId,
    pub sellable_id: SellableId,
    pub number: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub name: String,
    pub is_active: bool,
}

impl Client {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ClientId::new(),
            name: name.into(),
            is_active: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesPerson {
    pub id: SalesPersonId,
    pub name: String,
    /// Percentage of each received payment paid as commission.
    pub commission_percentage: Decimal,
}

impl SalesPerson {
    pub fn new(name: impl Into<String>, commission_percentage: Decimal) -> Self {
        Self {
            id: SalesPersonId::new(),
            name: name.into(),
            commission_percentage,
        }
    }
}

/// Registers and reads reference data inside a transaction.
#[derive(Debug, Clone, Default)]
pub struct CatalogService;

impl CatalogService {
    pub fn new() -> Self {
        Self
    }

    pub fn add_branch(&self, tx: &mut Transaction, branch: Branch) -> BranchId {
        let id = branch.id;
        tx.tables_mut().branches.insert(id, branch);
        id
    }

    pub fn add_station(&self, tx: &mut Transaction, station: Station) -> Result<StationId> {
        tx.run(|tx| {
            self.branch(tx, station.branch_id)?;
            let id = station.id;
            tx.tables_mut().stations.insert(id, station);
            Ok(id)
        })
    }

    pub fn add_sellable(&self, tx: &mut Transaction, sellable: Sellable) -> Result<SellableId> {
        tx.run(|tx| {
            if sellable.price.is_negative() {
                return Err(DomainError::InvalidValue(format!(
                    "price of {} cannot be negative",
                    sellable.code
                )));
            }
            let id = sellable.id;
            tx.tables_mut().sellables.insert(id, sellable);
            Ok(id)
        })
    }

    pub fn add_batch(
        &self,
        tx: &mut Transaction,
        sellable_id: SellableId,
        number: impl Into<String>,
    ) -> Result<BatchId> {
        tx.run(|tx| {
            if !self.sellable(tx, sellable_id)?.requires_batch()? {
                return Err(DomainError::InvalidValue(
                    "batches are only allowed for batch-tracked products".to_string(),
                ));
            }
            let batch = Batch {
                id: BatchId::new(),
                sellable_id,
                number: number.into(),
            };
            let id = batch.id;
            tx.tables_mut().batches.insert(id, batch);
            Ok(id)
        })
    }

    pub fn add_client(&self, tx: &mut Transaction, client: Client) -> ClientId {
        let id = client.id;
        tx.tables_mut().clients.insert(id, client);
        id
    }

    pub fn set_client_active(
        &self,
        tx: &mut Transaction,
        client_id: ClientId,
        is_active: bool,
    ) -> Result<()> {
        tx.run(|tx| {
            let client = tx
                .tables_mut()
                .clients
                .get_mut(&client_id)
                .ok_or_else(|| DomainError::not_found("Client", client_id))?;
            client.is_active = is_active;
            Ok(())
        })
    }

    pub fn add_sales_person(&self, tx: &mut Transaction, person: SalesPerson) -> Result<SalesPersonId> {
        tx.run(|tx| {
            if person.commission_percentage < Decimal::ZERO
                || person.commission_percentage > Decimal::ONE_HUNDRED
            {
                return Err(DomainError::InvalidValue(format!(
                    "commission percentage {} out of range",
                    person.commission_percentage
                )));
            }
            let id = person.id;
            tx.tables_mut().sales_persons.insert(id, person);
            Ok(id)
        })
    }

    pub fn branch(&self, tx: &Transaction, id: BranchId) -> Result<Branch> {
        tx.tables()
            .branches
            .get(&id)
            .cloned()
            .ok_or_else(|| DomainError::not_found("Branch", id))
    }

    pub fn station(&self, tx: &Transaction, id: StationId) -> Result<Station> {
        tx.tables()
            .stations
            .get(&id)
            .cloned()
            .ok_or_else(|| DomainError::not_found("Station", id))
    }

    pub fn sellable(&self, tx: &Transaction, id: SellableId) -> Result<Sellable> {
        tx.tables()
            .sellables
            .get(&id)
            .cloned()
            .ok_or_else(|| DomainError::not_found("Sellable", id))
    }

    pub fn batch(&self, tx: &Transaction, id: BatchId) -> Result<Batch> {
        tx.tables()
            .batches
            .get(&id)
            .cloned()
            .ok_or_else(|| DomainError::not_found("Batch", id))
    }

    pub fn client(&self, tx: &Transaction, id: ClientId) -> Result<Client> {
        tx.tables()
            .clients
            .get(&id)
            .cloned()
            .ok_or_else(|| DomainError::not_found("Client", id))
    }

    pub fn sales_person(&self, tx: &Transaction, id: SalesPersonId) -> Result<SalesPerson> {
        tx.tables()
            .sales_persons
            .get(&id)
            .cloned()
            .ok_or_else(|| DomainError::not_found("SalesPerson", id))
    }
}
