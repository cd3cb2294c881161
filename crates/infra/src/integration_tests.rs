//! End-to-end tests across the ledger, the alert engine and the rule engine.
//!
//! Covers the background pieces too: the event worker, the sweep runner and the
//! deferred-action executor, each on its own thread against shared stores.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use serde_json::json;

    use stockpilot_alerts::{AlertPriority, AlertType, NewAlert};
    use stockpilot_core::TenantId;
    use stockpilot_events::{EventBus, EventEnvelope, InMemoryEventBus};
    use stockpilot_rules::{
        Action, Conditions, ExecutionLimits, Operator, RuleActions, RuleDefinition, RuleTarget, RuleType, Schedule,
        SecondaryAction, StockUpdateMode, Trigger, TriggerEvent,
    };

    use crate::jobs::{JobExecutor, JobExecutorConfig, JobStore};
    use crate::rule_engine::{condition_data, register_deferred_handler};
    use crate::runners::{EventWorker, SweepRunner};
    use crate::test_support::Harness;

    fn wait_until(check: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(3);
        while Instant::now() < deadline {
            if check() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        check()
    }

    fn restock_rule(trigger: Trigger) -> RuleDefinition {
        RuleDefinition {
            name: "Restock below 20".to_string(),
            description: Some("top up items running low".to_string()),
            rule_type: RuleType::Reorder,
            conditions: Conditions {
                triggers: vec![trigger],
                filters: None,
            },
            actions: RuleActions {
                primary: Action::UpdateStock {
                    mode: StockUpdateMode::Increase,
                    quantity: 10,
                    reason: None,
                },
                secondary: vec![],
                notifications: vec![],
            },
            priority: 5,
            target: RuleTarget::global(),
            schedule: Schedule::realtime(),
            limits: ExecutionLimits::default(),
        }
    }

    fn open_of_type(h: &Harness, alert_type: AlertType) -> usize {
        h.alerts
            .list_open(h.tenant)
            .unwrap()
            .iter()
            .filter(|a| a.alert_type() == alert_type)
            .count()
    }

    #[test]
    fn dropping_below_reorder_point_raises_one_alert_per_type() {
        let h = Harness::new();
        let item = h.item("WIDGET", 100);
        assert!(h.alerts.list_open(h.tenant).unwrap().is_empty());

        let update = h
            .ledger
            .update_stock_level(h.tenant, item.id_typed(), 15, "cycle count")
            .unwrap();
        let raised: Vec<_> = update.alerts.iter().map(|a| a.alert_type()).collect();
        assert!(raised.contains(&AlertType::LowStock));
        assert!(raised.contains(&AlertType::ReorderNeeded));

        for _ in 0..3 {
            h.alerts.check_thresholds(&update.item).unwrap();
        }
        h.ledger
            .update_stock_level(h.tenant, item.id_typed(), 12, "damaged box")
            .unwrap();

        assert_eq!(open_of_type(&h, AlertType::LowStock), 1);
        assert_eq!(open_of_type(&h, AlertType::ReorderNeeded), 1);
    }

    #[test]
    fn restocking_clears_threshold_alerts() {
        let h = Harness::new();
        let item = h.item("WIDGET", 15);
        assert_eq!(open_of_type(&h, AlertType::LowStock), 1);

        h.ledger
            .update_stock_level(h.tenant, item.id_typed(), 120, "delivery")
            .unwrap();
        assert!(h.alerts.list_open(h.tenant).unwrap().is_empty());

        let history = h.alerts.list_for_item(h.tenant, item.id_typed()).unwrap();
        assert!(history.iter().all(|a| a.is_resolved()));
        assert!(history.iter().all(|a| a.resolved_by() == Some(crate::SYSTEM_ACTOR)));
    }

    #[test]
    fn repeated_low_stock_triggers_merge_details() {
        let h = Harness::new();
        let item = h.item("WIDGET", 100);
        let raise = |key: &str| {
            let mut details = serde_json::Map::new();
            details.insert(key.to_string(), json!(true));
            h.alerts
                .create_alert(NewAlert {
                    tenant_id: h.tenant,
                    item_id: item.id_typed(),
                    alert_type: AlertType::LowStock,
                    priority: AlertPriority::Medium,
                    message: "running low".to_string(),
                    details,
                    notification_settings: None,
                    created_by: "scanner".to_string(),
                })
                .unwrap()
        };

        let first = raise("fromScanner");
        let second = raise("fromCount");
        assert_eq!(first.id_typed(), second.id_typed());
        assert_eq!(open_of_type(&h, AlertType::LowStock), 1);
        assert!(second.details().contains_key("fromScanner"));
        assert!(second.details().contains_key("fromCount"));
    }

    #[test]
    fn rule_on_available_stock_matches_and_counts_one_execution() {
        let h = Harness::new();
        let item = h.item("WIDGET", 40);
        h.ledger.reserve_stock(h.tenant, item.id_typed(), 25, None).unwrap();
        let item = h.ledger.get_item(h.tenant, item.id_typed()).unwrap();
        assert_eq!(item.available_stock(), 15);

        let rule = h
            .rules
            .create_rule(
                h.tenant,
                restock_rule(Trigger::new("availableStock", Operator::LessThan, json!(20))),
                "planner",
                true,
            )
            .unwrap();
        assert!(h.rules.evaluate_conditions(&rule, &condition_data(&item, None).unwrap()));

        h.rules.execute_rule(h.tenant, rule.id_typed(), "planner").unwrap();
        let rule = h.rules.get_rule(h.tenant, rule.id_typed()).unwrap();
        assert_eq!(rule.stats().execution_count, 1);
        assert_eq!(rule.stats().success_rate, 1.0);

        let item = h.ledger.get_item(h.tenant, item.id_typed()).unwrap();
        assert_eq!((item.stock_level(), item.reserved_stock(), item.available_stock()), (50, 25, 25));
    }

    #[test]
    fn deactivated_items_are_out_of_scope() {
        let h = Harness::new();
        let item = h.item("RETIRED", 5);
        assert!(!h.alerts.list_open(h.tenant).unwrap().is_empty());

        h.ledger.deactivate_item(h.tenant, item.id_typed(), "discontinued").unwrap();
        assert!(h.alerts.list_open(h.tenant).unwrap().is_empty());

        let rule = h
            .rules
            .create_rule(
                h.tenant,
                restock_rule(Trigger::new("stockLevel", Operator::LessThan, json!(20))),
                "planner",
                true,
            )
            .unwrap();
        let report = h.rules.execute_rule(h.tenant, rule.id_typed(), "planner").unwrap();
        assert_eq!(report.evaluated_items, 0);
        assert!(h.ledger.update_stock_level(h.tenant, item.id_typed(), 50, "count").is_err());
    }

    #[test]
    fn tenants_do_not_see_each_other() {
        let h = Harness::new();
        let other = TenantId::new();
        let item = h.item("WIDGET", 15);
        h.rules
            .create_rule(
                h.tenant,
                restock_rule(Trigger::new("stockLevel", Operator::LessThan, json!(20))),
                "planner",
                true,
            )
            .unwrap();

        assert!(h.ledger.get_item(other, item.id_typed()).unwrap_err().is_not_found());
        assert!(h.ledger.list_items(other).unwrap().is_empty());
        assert!(h.rules.list_rules(other).unwrap().is_empty());
        assert!(h.alerts.list_open(other).unwrap().is_empty());
        assert_eq!(h.rules.run_sweep(other).unwrap().due, 0);
    }

    #[test]
    fn stale_high_alert_is_escalated_by_the_sweep() {
        let h = Harness::new();
        let item = h.item("WIDGET", 100);
        let alert = h
            .alerts
            .create_alert(NewAlert {
                tenant_id: h.tenant,
                item_id: item.id_typed(),
                alert_type: AlertType::Manual,
                priority: AlertPriority::High,
                message: "count the shelf".to_string(),
                details: serde_json::Map::new(),
                notification_settings: None,
                created_by: "ops".to_string(),
            })
            .unwrap();

        h.clock.advance(chrono::Duration::hours(3));
        assert_eq!(h.alerts.sweep_stale(h.tenant).unwrap().escalated, 0);

        h.clock.advance(chrono::Duration::hours(2));
        assert_eq!(h.alerts.sweep_stale(h.tenant).unwrap().escalated, 1);
        let alert = h.alerts.get(h.tenant, alert.id_typed()).unwrap();
        assert_eq!(alert.priority(), AlertPriority::Critical);
        assert_eq!(alert.occurrence_count(), 2);
    }

    #[test]
    fn event_worker_dispatches_published_events() {
        let h = Harness::new();
        let item = h.item("WIDGET", 15);
        h.rules
            .create_rule(
                h.tenant,
                restock_rule(Trigger::new("event.newStock", Operator::LessThan, json!(20))),
                "planner",
                true,
            )
            .unwrap();

        let bus: Arc<InMemoryEventBus<EventEnvelope<TriggerEvent>>> = Arc::new(InMemoryEventBus::new());
        let worker = EventWorker::spawn("test-event-worker", bus.clone(), Some(h.tenant), h.rules.clone());

        let event = TriggerEvent::StockChanged {
            item_id: item.id_typed(),
            previous_stock: 40,
            new_stock: 15,
        };
        bus.publish(EventEnvelope::new(TenantId::new(), event.clone())).unwrap();
        bus.publish(EventEnvelope::new(h.tenant, event)).unwrap();

        let ledger = h.ledger.clone();
        let tenant = h.tenant;
        assert!(wait_until(|| ledger.get_item(tenant, item.id_typed()).unwrap().stock_level() == 25));
        worker.shutdown();

        let rules = h.rules.list_rules(h.tenant).unwrap();
        assert_eq!(rules[0].stats().execution_count, 1);
    }

    #[test]
    fn sweep_runner_executes_due_rules_on_startup() {
        let h = Harness::new();
        let item = h.item("WIDGET", 15);
        h.rules
            .create_rule(
                h.tenant,
                restock_rule(Trigger::new("stockLevel", Operator::LessThan, json!(20))),
                "planner",
                true,
            )
            .unwrap();

        let runner = SweepRunner {
            interval: Duration::from_secs(3600),
            alert_sweep: true,
        };
        let handle = runner.spawn_for_tenant("test-sweep", h.tenant, h.rules.clone(), h.alerts.clone());

        let ledger = h.ledger.clone();
        let tenant = h.tenant;
        assert!(wait_until(|| ledger.get_item(tenant, item.id_typed()).unwrap().stock_level() == 25));
        handle.trigger();
        handle.shutdown();
    }

    #[test]
    fn background_executor_runs_deferred_actions() {
        let h = Harness::new();
        let item = h.item("WIDGET", 15);
        let mut def = restock_rule(Trigger::new("stockLevel", Operator::LessThan, json!(20)));
        def.actions.secondary.push(SecondaryAction {
            action: Action::UpdateStock {
                mode: StockUpdateMode::Increase,
                quantity: 5,
                reason: Some("follow-up top-up".to_string()),
            },
            delay_minutes: 10,
        });
        let rule = h.rules.create_rule(h.tenant, def, "planner", true).unwrap();
        h.rules.execute_rule(h.tenant, rule.id_typed(), "planner").unwrap();

        let mut executor = JobExecutor::new(h.jobs.clone(), h.clock.clone());
        register_deferred_handler(&mut executor, h.rules.clone());
        let handle = executor.spawn(
            JobExecutorConfig::default()
                .with_name("test-deferred")
                .with_tenant(h.tenant)
                .with_poll_interval(Duration::from_millis(10)),
        );

        h.clock.advance(chrono::Duration::minutes(10));
        let jobs = h.jobs.clone();
        let tenant = h.tenant;
        assert!(wait_until(|| jobs.stats(tenant).unwrap().completed == 1));
        assert!(wait_until(|| handle.stats().jobs_succeeded == 1));
        handle.shutdown();

        assert_eq!(h.ledger.get_item(h.tenant, item.id_typed()).unwrap().stock_level(), 30);
        let reasons: Vec<_> = h
            .ledger
            .list_movements(h.tenant, item.id_typed())
            .unwrap()
            .iter()
            .map(|m| m.reason().to_string())
            .collect();
        assert_eq!(reasons.last().map(String::as_str), Some("follow-up top-up"));
    }

    #[test]
    fn rule_raised_reorder_stays_open_across_ledger_writes() {
        let h = Harness::new();
        let item = h.item("BULK-BIN", 150);
        let mut def = restock_rule(Trigger::new("stockLevel", Operator::LessThan, json!(160)));
        def.actions.primary = Action::CreateReorder {
            quantity: Some(40),
            priority: AlertPriority::Medium,
        };
        let rule = h.rules.create_rule(h.tenant, def, "planner", true).unwrap();
        h.rules.execute_rule(h.tenant, rule.id_typed(), "planner").unwrap();
        assert_eq!(open_of_type(&h, AlertType::ReorderNeeded), 1);

        assert!(h.ledger.reserve_stock(h.tenant, item.id_typed(), 1, None).unwrap());
        h.ledger.release_stock(h.tenant, item.id_typed(), 1, None).unwrap();
        h.ledger
            .update_stock_level(h.tenant, item.id_typed(), 140, "cycle count")
            .unwrap();

        let reorders: Vec<_> = h
            .alerts
            .list_for_item(h.tenant, item.id_typed())
            .unwrap()
            .into_iter()
            .filter(|a| a.alert_type() == AlertType::ReorderNeeded)
            .collect();
        assert_eq!(reorders.len(), 1);
        assert!(reorders[0].is_open());
        assert_eq!(reorders[0].created_by(), format!("rule:{}", rule.id_typed()));
    }

    #[test]
    fn execution_limits_survive_a_flood_of_rejected_attempts() {
        let h = Harness::new();
        h.item("WIDGET", 15);
        let mut def = restock_rule(Trigger::new("stockLevel", Operator::GreaterThan, json!(0)));
        def.limits.max_executions_per_day = Some(2);
        def.limits.max_executions_per_hour = Some(2);
        let rule = h.rules.create_rule(h.tenant, def, "planner", true).unwrap();

        h.rules.execute_rule(h.tenant, rule.id_typed(), "planner").unwrap();
        h.rules.execute_rule(h.tenant, rule.id_typed(), "planner").unwrap();
        for _ in 0..150 {
            let err = h.rules.execute_rule(h.tenant, rule.id_typed(), "planner").unwrap_err();
            assert!(err.is_gate());
        }

        assert!(!h.rules.can_execute(h.tenant, rule.id_typed()).unwrap());
        h.clock.advance(chrono::Duration::hours(2));
        assert!(!h.rules.can_execute(h.tenant, rule.id_typed()).unwrap());
        assert!(h.rules.execute_rule(h.tenant, rule.id_typed(), "planner").unwrap_err().is_gate());

        let stored = h.rules.get_rule(h.tenant, rule.id_typed()).unwrap();
        assert_eq!(stored.stats().execution_count, 153);
        assert_eq!(stored.stats().success_count, 2);
    }
}
