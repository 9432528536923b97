use crate::anchor::Anchor;
use crate::movable_content::{MovableContent, MovableContentState, StateReference};
use crate::recompose_scope::RecomposeScope;
use crate::recomposer::CompositionId;

#[test]
fn distinct_handles_are_not_the_same_content() {
    let a = MovableContent::new();
    let b = MovableContent::new();
    assert!(!a.same_content(&b));
}

#[test]
fn clones_are_the_same_content() {
    let a = MovableContent::new();
    let b = a.clone();
    assert!(a.same_content(&b));
    assert_eq!(a, b);
}

#[test]
fn take_scopes_drains_and_leaves_state_empty() {
    let content = MovableContent::new();
    let mut state = MovableContentState::new(content);
    state.scopes.push(RecomposeScope::new(Anchor::new(0)));
    state.scopes.push(RecomposeScope::new(Anchor::new(1)));

    let taken = state.take_scopes();
    assert_eq!(taken.len(), 2);
    assert!(state.scopes.is_empty());
}

#[test]
fn state_reference_nests_without_flattening() {
    let outer_content = MovableContent::new();
    let inner_content = MovableContent::new();
    let mut outer = StateReference::new(outer_content.clone(), 3, CompositionId::new(0));
    outer
        .nested_references
        .push(StateReference::new(inner_content.clone(), 7, CompositionId::new(0)));

    assert!(outer.content.same_content(&outer_content));
    assert_eq!(outer.container_group, 3);
    assert_eq!(outer.nested_references.len(), 1);
    assert!(outer.nested_references[0].content.same_content(&inner_content));
    assert_eq!(outer.nested_references[0].container_group, 7);
}
