use state_machines::state_machine;

state_machine! {
    name: GraphMachine,
    state: GraphState,
    initial: Empty,
    states: [Empty, Building, Ready, Stale, Rebuilding],
    events {
        start_build { transition: { from: Empty, to: Building } }
        complete_build { transition: { from: Building, to: Ready } }
        invalidate {
            transition: { from: Ready, to: Stale }
        }
        rebuild { transition: { from: Stale, to: Rebuilding } }
        complete_rebuild { transition: { from: Rebuilding, to: Ready } }
        fail_build {
            transition: { from: Building, to: Stale }
            transition: { from: Rebuilding, to: Stale }
        }
    }
}

pub fn empty() -> GraphMachine<(), Empty> {
    GraphMachine::new(())
}

/// Whether queries are servable against a graph currently in `state`. Queries are served
/// in `Ready` and `Stale` (the latter with a staleness header); rejected in `Building` and
/// `Rebuilding`.
pub fn queryable(state: &str) -> bool {
    matches!(state, "Ready" | "Stale")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queries_rejected_while_building_or_rebuilding() {
        assert!(!queryable("Building"));
        assert!(!queryable("Rebuilding"));
        assert!(queryable("Ready"));
        assert!(queryable("Stale"));
        assert!(!queryable("Empty"));
    }
}
