//! Shared fixture for the integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Once};

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use common::{BranchId, Money, PaymentMethodId, SaleId, SalesPersonId, SellableId, StationId, UserId};
use domain::{
    Branch, CoreConfig, DomainError, FixedClock, PaymentMethod, PaymentMethodKind, PosCore, SalesPerson,
    Sellable, SessionContext, Station, StockMovement, StockReason, Transaction,
};
use journal::InMemoryJournal;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

static TRACING: Once = Once::new();

/// Honors `RUST_LOG` when set; silent otherwise.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 10, 9, 0, 0).unwrap()
}

pub fn today() -> NaiveDate {
    start().date_naive()
}

/// One branch with one station, a salesperson earning 5%, a money method
/// and product P with 10 units in stock.
pub struct Fixture {
    pub core: PosCore,
    pub clock: Arc<FixedClock>,
    pub user: UserId,
    pub branch: BranchId,
    pub station: StationId,
    pub salesperson: SalesPersonId,
    pub money: PaymentMethodId,
    pub product: SellableId,
}

impl Fixture {
    pub async fn new() -> Self {
        Self::with_config(CoreConfig::default()).await
    }

    pub async fn with_config(config: CoreConfig) -> Self {
        let clock = Arc::new(FixedClock::new(start()));
        let core = PosCore::new(Arc::new(InMemoryJournal::new()), clock.clone(), config);
        Self::with_core(core, clock).await
    }

    /// Seeds an already built core whose clock is `clock`.
    pub async fn with_core(core: PosCore, clock: Arc<FixedClock>) -> Self {
        init_tracing();
        let user = UserId::new();
        let branch = Branch::new("Main");
        let branch_id = branch.id;
        let mut tx = core.begin(SessionContext::new(user, branch_id)).await;
        core.catalog.add_branch(&mut tx, branch);
        let station = core
            .catalog
            .add_station(&mut tx, Station::new(branch_id, "Front desk"))
            .unwrap();
        let salesperson = core
            .catalog
            .add_sales_person(&mut tx, SalesPerson::new("Ana", dec!(5)))
            .unwrap();
        let money = core
            .payments
            .add_method(&mut tx, PaymentMethod::new(PaymentMethodKind::Money, "Money"))
            .unwrap();
        let product = core
            .catalog
            .add_sellable(
                &mut tx,
                Sellable::product("P", "Product P", Money::from_cents(1000)),
            )
            .unwrap();
        core.stock
            .increase_stock(
                &mut tx,
                StockMovement::new(product, branch_id, dec!(10), StockReason::Initial),
            )
            .unwrap();
        tx.commit().await.unwrap();

        Self {
            core,
            clock,
            user,
            branch: branch_id,
            station,
            salesperson,
            money,
            product,
        }
    }

    /// A transaction at the fixture's station.
    pub async fn tx(&self) -> Transaction {
        self.core
            .begin(SessionContext::new(self.user, self.branch).at_station(self.station))
            .await
    }

    /// Runs an operation expected to fail in a transaction of its own and
    /// checks that the failure aborted it.
    pub async fn refused<T: std::fmt::Debug>(
        &self,
        operation: impl FnOnce(&mut Transaction) -> Result<T, DomainError>,
    ) -> DomainError {
        let mut tx = self.tx().await;
        let err = operation(&mut tx).unwrap_err();
        assert!(tx.is_aborted());
        assert!(matches!(
            tx.commit().await,
            Err(DomainError::TransactionAborted)
        ));
        err
    }

    pub fn stock(&self, tx: &Transaction, sellable: SellableId) -> Decimal {
        self.core.stock.balance(tx, sellable, self.branch, None)
    }

    /// A sale of `quantity` P at 10.00 paid with one money payment.
    pub fn quote(&self, tx: &mut Transaction, quantity: Decimal) -> SaleId {
        let sales = &self.core.sales;
        let sale = sales.create_sale(tx, self.salesperson, None).unwrap();
        sales
            .add_sellable(tx, sale, self.product, quantity, None, None)
            .unwrap();
        let total = sales.sale(tx, sale).unwrap().total();
        sales
            .add_payments(tx, sale, self.money, total, &[today()], Decimal::ZERO)
            .unwrap();
        sale
    }
}
