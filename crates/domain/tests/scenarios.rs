//! End-to-end flows across tills, payments, sales and work orders.

mod support;

use chrono::Duration;
use common::Money;
use domain::{
    DomainError, GroupKind, PaymentDirection, PaymentMethod, PaymentMethodKind, PaymentStatus,
    SaleStatus, Sellable, StockMovement, StockReason, TillStatus, WorkOrderStatus,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use support::{Fixture, today};

mod happy_path_sale {
    use super::*;

    #[tokio::test]
    async fn confirm_pay_and_close_the_till() {
        let fx = Fixture::new().await;
        let mut tx = fx.tx().await;
        let till = fx.core.tills.open_till(&mut tx, fx.station).unwrap();
        assert_eq!(
            fx.core.tills.till(&tx, till).unwrap().initial_cash_amount(),
            Money::zero()
        );

        let sale = fx.quote(&mut tx, dec!(3));
        fx.core.sales.confirm(&mut tx, sale).unwrap();

        assert_eq!(fx.stock(&tx, fx.product), dec!(7));
        let confirmed = fx.core.sales.sale(&tx, sale).unwrap();
        assert_eq!(confirmed.status(), SaleStatus::Confirmed);
        assert_eq!(confirmed.items()[0].quantity_decreased, dec!(3));
        assert_eq!(confirmed.till_id(), Some(till));
        let group = fx.core.payments.group(&tx, confirmed.group_id()).unwrap();
        assert!(
            group
                .payments()
                .iter()
                .all(|p| p.status == PaymentStatus::Pending)
        );
        let history = fx.core.sales.history(&tx, sale);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].old_value.as_deref(), Some("Opened"));
        assert_eq!(history[0].new_value.as_deref(), Some("Confirmed"));

        let paid = fx.core.sales.pay(&mut tx, sale).unwrap();
        assert_eq!(paid.len(), 1);
        let payment = fx.core.payments.payment(&tx, paid[0]).unwrap();
        assert_eq!(payment.status, PaymentStatus::Paid);
        assert_eq!(payment.paid_value, Some(Money::from_cents(3000)));

        let open = fx.core.tills.till(&tx, till).unwrap();
        assert_eq!(open.entries().len(), 1);
        assert_eq!(open.entries()[0].value, Money::from_cents(3000));
        assert_eq!(open.balance(), Money::from_cents(3000));

        let final_cash = fx.core.tills.close_till(&mut tx, till, None).unwrap();
        assert_eq!(final_cash, Money::from_cents(3000));
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn paying_accrues_commission() {
        let fx = Fixture::new().await;
        let mut tx = fx.tx().await;
        fx.core.tills.open_till(&mut tx, fx.station).unwrap();
        let sale = fx.quote(&mut tx, dec!(3));
        fx.core.sales.confirm(&mut tx, sale).unwrap();
        fx.core.sales.pay(&mut tx, sale).unwrap();

        let commissions = fx.core.sales.commissions(&tx, sale);
        assert_eq!(commissions.len(), 1);
        assert_eq!(commissions[0].value, Money::from_cents(150));
    }
}

mod till_negative_close {
    use super::*;

    #[tokio::test]
    async fn close_is_blocked_and_the_ledger_untouched() {
        let fx = Fixture::new().await;

        let mut tx = fx.tx().await;
        let first = fx.core.tills.open_till(&mut tx, fx.station).unwrap();
        fx.core
            .tills
            .add_cash(&mut tx, first, Money::from_cents(1000), "Opening float")
            .unwrap();
        fx.core.tills.close_till(&mut tx, first, None).unwrap();
        tx.commit().await.unwrap();

        fx.clock.advance(Duration::days(1));
        let mut tx = fx.tx().await;
        let till = fx.core.tills.open_till(&mut tx, fx.station).unwrap();
        assert_eq!(
            fx.core.tills.till(&tx, till).unwrap().initial_cash_amount(),
            Money::from_cents(1000)
        );

        fx.core
            .tills
            .remove_cash(&mut tx, till, Money::from_cents(2000), "Supplier expense")
            .unwrap();
        let before = fx.core.tills.till(&tx, till).unwrap();
        assert_eq!(before.balance(), Money::from_cents(-1000));

        let err = fx.core.tills.close_till(&mut tx, till, None).unwrap_err();
        assert!(matches!(err, DomainError::TillNegativeBalance { .. }));

        let after = fx.core.tills.till(&tx, till).unwrap();
        assert_eq!(after.status(), TillStatus::Open);
        assert_eq!(after.entries(), before.entries());
    }
}

mod sale_cancel {
    use super::*;

    #[tokio::test]
    async fn confirmed_sale_returns_its_stock() {
        let fx = Fixture::new().await;
        let mut tx = fx.tx().await;
        fx.core.tills.open_till(&mut tx, fx.station).unwrap();
        let sale = fx.quote(&mut tx, dec!(3));
        fx.core.sales.confirm(&mut tx, sale).unwrap();
        assert_eq!(fx.stock(&tx, fx.product), dec!(7));

        fx.core
            .sales
            .cancel(&mut tx, sale, "client gave up", false)
            .unwrap();

        assert_eq!(fx.stock(&tx, fx.product), dec!(10));
        let cancelled = fx.core.sales.sale(&tx, sale).unwrap();
        assert_eq!(cancelled.status(), SaleStatus::Cancelled);
        assert_eq!(cancelled.items()[0].quantity_decreased, Decimal::ZERO);
        let group = fx.core.payments.group(&tx, cancelled.group_id()).unwrap();
        assert!(
            group
                .payments()
                .iter()
                .all(|p| p.status == PaymentStatus::Cancelled)
        );
        let last = fx.core.sales.history(&tx, sale).pop().unwrap();
        assert_eq!(last.new_value.as_deref(), Some("Cancelled"));
        assert_eq!(last.notes.as_deref(), Some("client gave up"));
    }

    #[tokio::test]
    async fn coupled_work_order_blocks_cancel() {
        let fx = Fixture::new().await;
        let mut tx = fx.tx().await;
        let sale = fx.quote(&mut tx, dec!(1));
        let order = fx.core.work_orders.create(&mut tx, "Repair", None).unwrap();
        fx.core
            .work_orders
            .link_to_sale(&mut tx, order, sale)
            .unwrap();

        let err = fx
            .core
            .sales
            .cancel(&mut tx, sale, "wrong item", false)
            .unwrap_err();
        assert!(matches!(err, DomainError::HasCoupledWorkOrder));
        assert_eq!(
            fx.core.sales.sale(&tx, sale).unwrap().status(),
            SaleStatus::Opened
        );
    }
}

mod work_order_reservations {
    use super::*;

    #[tokio::test]
    async fn reserve_return_and_deliver() {
        let fx = Fixture::new().await;
        let mut tx = fx.tx().await;
        let wo = &fx.core.work_orders;

        let order = wo.create(&mut tx, "Assemble display", None).unwrap();
        let item = wo
            .add_sellable(&mut tx, order, fx.product, dec!(5), None)
            .unwrap();
        wo.approve(&mut tx, order).unwrap();
        wo.work(&mut tx, order).unwrap();

        wo.reserve(&mut tx, order, item, dec!(3)).unwrap();
        assert_eq!(fx.stock(&tx, fx.product), dec!(7));
        let reserved = wo.work_order(&tx, order).unwrap();
        assert_eq!(reserved.item(item).unwrap().quantity_decreased, dec!(3));

        wo.return_to_stock(&mut tx, order, item, dec!(2)).unwrap();
        assert_eq!(fx.stock(&tx, fx.product), dec!(9));
        let returned = wo.work_order(&tx, order).unwrap();
        assert_eq!(returned.item(item).unwrap().quantity_decreased, dec!(1));

        tx.commit().await.unwrap();

        let err = fx.refused(|tx| wo.close(tx, order)).await;
        assert!(matches!(err, DomainError::InvalidStatus { .. }));

        let mut tx = fx.tx().await;
        wo.reserve(&mut tx, order, item, dec!(4)).unwrap();
        wo.finish(&mut tx, order).unwrap();
        wo.close(&mut tx, order).unwrap();

        let delivered = wo.work_order(&tx, order).unwrap();
        assert_eq!(delivered.status(), WorkOrderStatus::Delivered);
        assert_eq!(fx.stock(&tx, fx.product), dec!(5));
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn over_reservation_is_rejected() {
        let fx = Fixture::new().await;
        let mut tx = fx.tx().await;
        let wo = &fx.core.work_orders;
        let order = wo.create(&mut tx, "Frame", None).unwrap();
        let item = wo
            .add_sellable(&mut tx, order, fx.product, dec!(2), None)
            .unwrap();

        assert!(matches!(
            wo.reserve(&mut tx, order, item, dec!(3)),
            Err(DomainError::OverReserve { .. })
        ));
        assert_eq!(fx.stock(&tx, fx.product), dec!(10));
    }
}

mod sale_cancel_propagation {
    use super::*;

    #[tokio::test]
    async fn finished_work_order_is_reopened_then_cancelled() {
        let fx = Fixture::new().await;
        let mut tx = fx.tx().await;
        let part = fx
            .core
            .catalog
            .add_sellable(&mut tx, Sellable::product("Q", "Part Q", Money::from_cents(2500)))
            .unwrap();
        fx.core
            .stock
            .increase_stock(
                &mut tx,
                StockMovement::new(part, fx.branch, dec!(2), StockReason::Initial),
            )
            .unwrap();

        let sale = fx
            .core
            .sales
            .create_sale(&mut tx, fx.salesperson, None)
            .unwrap();
        let wo = &fx.core.work_orders;
        let order = wo.create(&mut tx, "Install Q", None).unwrap();
        wo.link_to_sale(&mut tx, order, sale).unwrap();
        let item = wo.add_sellable(&mut tx, order, part, dec!(2), None).unwrap();
        wo.approve(&mut tx, order).unwrap();
        wo.work(&mut tx, order).unwrap();

        let total = fx.core.sales.sale(&tx, sale).unwrap().total();
        fx.core
            .sales
            .add_payments(&mut tx, sale, fx.money, total, &[today()], Decimal::ZERO)
            .unwrap();
        fx.core.sales.confirm(&mut tx, sale).unwrap();
        assert_eq!(fx.stock(&tx, part), Decimal::ZERO);
        let linked = wo.work_order(&tx, order).unwrap();
        assert_eq!(linked.item(item).unwrap().quantity_decreased, dec!(2));

        wo.finish(&mut tx, order).unwrap();
        fx.core
            .sales
            .cancel(&mut tx, sale, "client changed plans", true)
            .unwrap();

        let cancelled = wo.work_order(&tx, order).unwrap();
        assert_eq!(cancelled.status(), WorkOrderStatus::Cancelled);
        assert_eq!(cancelled.item(item).unwrap().quantity_decreased, Decimal::ZERO);
        assert_eq!(fx.stock(&tx, part), dec!(2));

        let history = wo.history(&tx, order);
        let tail: Vec<_> = history[history.len() - 2..]
            .iter()
            .map(|h| (h.old_value.as_deref(), h.new_value.as_deref(), h.notes.as_deref()))
            .collect();
        assert_eq!(
            tail,
            [
                (
                    Some("Finished"),
                    Some("In progress"),
                    Some("Reopening work order to cancel the sale")
                ),
                (
                    Some("In progress"),
                    Some("Cancelled"),
                    Some("The sale was cancelled")
                ),
            ]
        );
        tx.commit().await.unwrap();
    }
}

mod installment_rounding {
    use super::*;

    #[tokio::test]
    async fn interest_residual_goes_to_the_first_installment() {
        let fx = Fixture::new().await;
        let mut tx = fx.tx().await;
        let method = fx
            .core
            .payments
            .add_method(
                &mut tx,
                PaymentMethod::new(PaymentMethodKind::Money, "Money 1%").with_interest(dec!(1)),
            )
            .unwrap();
        let group = fx
            .core
            .payments
            .create_group(&mut tx, GroupKind::Sale, "Installments")
            .unwrap();
        let due = [today(), today() + Duration::days(30), today() + Duration::days(60)];

        let ids = fx
            .core
            .payments
            .create_payments(
                &mut tx,
                group,
                method,
                PaymentDirection::In,
                Money::from_cents(10000),
                &due,
                dec!(1),
            )
            .unwrap();

        let values: Vec<Money> = ids
            .iter()
            .map(|id| fx.core.payments.payment(&tx, *id).unwrap().value)
            .collect();
        let expected =
            domain::payment::installment_values(Money::from_cents(10000), 3, dec!(1)).unwrap();
        assert_eq!(values, expected);
        assert_eq!(
            values,
            [
                Money::from_cents(3401),
                Money::from_cents(3400),
                Money::from_cents(3400)
            ]
        );
        assert_eq!(
            values.iter().sum::<Money>(),
            fx.core.payments.group(&tx, group).unwrap().total()
        );
        assert_eq!(values.iter().sum::<Money>(), Money::from_cents(10201));
    }
}
