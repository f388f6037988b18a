use state_machines::state_machine;

state_machine! {
    name: KnowledgeMachine,
    state: KnowledgeState,
    initial: Ready,
    states: [Ready, Extracted, Enriched, Chunked, Indexed, Failed],
    events {
        extract { transition: { from: Ready, to: Extracted } }
        enrich { transition: { from: Extracted, to: Enriched } }
        chunk { transition: { from: Enriched, to: Chunked } }
        index { transition: { from: Chunked, to: Indexed } }
        abort {
            transition: { from: Ready, to: Failed }
            transition: { from: Extracted, to: Failed }
            transition: { from: Enriched, to: Failed }
            transition: { from: Chunked, to: Failed }
        }
    }
}

pub fn ready() -> KnowledgeMachine<(), Ready> {
    KnowledgeMachine::new(())
}
