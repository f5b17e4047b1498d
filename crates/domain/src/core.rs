//! Wiring of the store, the event bus and the services.

use std::sync::Arc;

use journal::{InMemoryJournal, Journal, PostgresJournal};

use crate::audit::AuditLog;

use crate::catalog::CatalogService;
use crate::clock::{Clock, SystemClock};
use crate::config::CoreConfig;
use crate::error::Result;
use crate::events::EventBus;
use crate::payment::PaymentService;
use crate::sale::SaleService;
use crate::stock::StockGateway;
use crate::store::{Database, SessionContext, Transaction};
use crate::till::{PaymentReversalObserver, TillService};
use crate::workorder::{SaleCancellationObserver, WorkOrderService};

/// The transactional core: one database and the services working on it.
///
/// Every operation takes a [`Transaction`] opened with [`PosCore::begin`];
/// nothing is visible to other transactions until it commits.
#[derive(Clone)]
pub struct PosCore {
    pub db: Database,
    pub config: CoreConfig,
    pub catalog: CatalogService,
    pub stock: StockGateway,
    pub payments: PaymentService,
    pub tills: TillService,
    pub sales: SaleService,
    pub work_orders: WorkOrderService,
    pub audit: AuditLog,
}

impl PosCore {
    /// Builds the services and registers the cross-aggregate subscribers.
    pub fn new(journal: Arc<dyn Journal>, clock: Arc<dyn Clock>, config: CoreConfig) -> Self {
        let payments = PaymentService::new(config.clone());
        let tills = TillService::new(config.clone(), payments.clone());
        let work_orders = WorkOrderService::new();
        let sales = SaleService::new(
            config.clone(),
            payments.clone(),
            tills.clone(),
            work_orders.clone(),
        );

        let mut bus = EventBus::new();
        bus.subscribe(Arc::new(SaleCancellationObserver::new(work_orders.clone())));
        bus.subscribe(Arc::new(PaymentReversalObserver::new(tills.clone())));

        tracing::info!(
            max_installments = config.default_max_installments,
            mandatory_interest = config.mandatory_interest,
            "core initialized"
        );

        Self {
            audit: AuditLog::new(Arc::clone(&journal)),
            db: Database::new(journal, clock, bus),
            config,
            catalog: CatalogService::new(),
            stock: StockGateway::new(),
            payments,
            tills,
            sales,
            work_orders,
        }
    }

    /// A core journaling to PostgreSQL at `database_url`, migrating the
    /// journal table first.
    pub async fn connect(database_url: &str, clock: Arc<dyn Clock>, config: CoreConfig) -> Result<Self> {
        let journal = PostgresJournal::connect(database_url).await?;
        journal.run_migrations().await?;
        Ok(Self::new(Arc::new(journal), clock, config))
    }

    /// A core journaling to memory on the wall clock with default settings.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryJournal::new()),
            Arc::new(SystemClock),
            CoreConfig::default(),
        )
    }

    pub async fn begin(&self, context: SessionContext) -> Transaction {
        self.db.begin(context).await
    }
}
