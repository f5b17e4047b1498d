use common::{BranchId, Money, PaymentMethodId, SalesPersonId, SellableId, UserId};
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{
    Branch, PaymentMethod, PaymentMethodKind, PosCore, SalesPerson, Sellable, SessionContext,
    Station, StockMovement, StockReason, payment::installment_values,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

struct Shop {
    core: PosCore,
    context: SessionContext,
    salesperson: SalesPersonId,
    money: PaymentMethodId,
    product: SellableId,
}

async fn shop() -> Shop {
    let core = PosCore::in_memory();
    let branch = Branch::new("Bench");
    let branch_id: BranchId = branch.id;
    let user = UserId::new();

    let mut tx = core.begin(SessionContext::new(user, branch_id)).await;
    core.catalog.add_branch(&mut tx, branch);
    let station = core
        .catalog
        .add_station(&mut tx, Station::new(branch_id, "Bench desk"))
        .unwrap();
    let salesperson = core
        .catalog
        .add_sales_person(&mut tx, SalesPerson::new("Bench", dec!(3)))
        .unwrap();
    let money = core
        .payments
        .add_method(&mut tx, PaymentMethod::new(PaymentMethodKind::Money, "Money"))
        .unwrap();
    let product = core
        .catalog
        .add_sellable(&mut tx, Sellable::product("B", "Bench item", Money::from_cents(1999)))
        .unwrap();
    core.stock
        .increase_stock(
            &mut tx,
            StockMovement::new(product, branch_id, dec!(1000000), StockReason::Initial),
        )
        .unwrap();
    core.tills.open_till(&mut tx, station).unwrap();
    tx.commit().await.unwrap();

    Shop {
        core,
        context: SessionContext::new(user, branch_id).at_station(station),
        salesperson,
        money,
        product,
    }
}

fn bench_installment_values(c: &mut Criterion) {
    let total = Money::from_cents(123_456);

    c.bench_function("payment/installments_12_no_interest", |b| {
        b.iter(|| installment_values(total, 12, Decimal::ZERO).unwrap());
    });

    c.bench_function("payment/installments_12_with_interest", |b| {
        b.iter(|| installment_values(total, 12, dec!(2.5)).unwrap());
    });
}

fn bench_sale_cycle(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let shop = rt.block_on(shop());

    c.bench_function("sale/create_confirm_pay", |b| {
        b.iter(|| {
            rt.block_on(async {
                let core = &shop.core;
                let mut tx = core.begin(shop.context).await;
                let sale = core.sales.create_sale(&mut tx, shop.salesperson, None).unwrap();
                core.sales
                    .add_sellable(&mut tx, sale, shop.product, dec!(2), None, None)
                    .unwrap();
                let total = core.sales.sale(&tx, sale).unwrap().total();
                let today = tx.today();
                core.sales
                    .add_payments(&mut tx, sale, shop.money, total, &[today], Decimal::ZERO)
                    .unwrap();
                core.sales.confirm(&mut tx, sale).unwrap();
                core.sales.pay(&mut tx, sale).unwrap();
                tx.commit().await.unwrap();
            });
        });
    });
}

criterion_group!(benches, bench_installment_values, bench_sale_cycle);
criterion_main!(benches);
