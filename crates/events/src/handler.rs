/// Execute an aggregate command deterministically (no IO).
///
/// 1. `aggregate.handle(command)` decides which events happen (no mutation)
/// 2. each event is applied to the aggregate in order
///
/// Returns the applied events so callers can persist derived records (e.g. ledger
/// movements) and persist the aggregate with an optimistic version check.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: stockpilot_core::Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}
