use state_machines::state_machine;

state_machine! {
    name: IngestionMachine,
    state: IngestionState,
    initial: Ready,
    states: [Ready, Chunked, Enriched, Persisted, GraphIntegrated, Failed],
    events {
        chunk { transition: { from: Ready, to: Chunked } }
        enrich { transition: { from: Chunked, to: Enriched } }
        persist { transition: { from: Enriched, to: Persisted } }
        integrate_graph { transition: { from: Persisted, to: GraphIntegrated } }
        abort {
            transition: { from: Ready, to: Failed }
            transition: { from: Chunked, to: Failed }
            transition: { from: Enriched, to: Failed }
            transition: { from: Persisted, to: Failed }
            transition: { from: GraphIntegrated, to: Failed }
        }
    }
}

pub fn ready() -> IngestionMachine<(), Ready> {
    IngestionMachine::new(())
}
