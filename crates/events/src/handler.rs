/// Decide and evolve in one step, without IO.
///
/// Calls `handle` and folds every resulting event back into the aggregate.
/// Workflows use it to stage changes on an aggregate they will commit later;
/// tests use it to drive an aggregate through several commands.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: bizdesk_core::Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}
