use super::ComponentState;
use std::collections::BTreeMap;
use tracing::debug;

/// Last reported lifecycle state of each booth component
#[derive(Debug, Default)]
pub struct ComponentStates {
    states: BTreeMap<&'static str, ComponentState>,
}

impl ComponentStates {
    pub fn set(&mut self, component: &'static str, state: ComponentState) {
        debug!("Component '{}' state changed to: {:?}", component, state);
        self.states.insert(component, state);
    }

    pub fn get(&self, component: &str) -> Option<&ComponentState> {
        self.states.get(component)
    }

    /// True if any of `components` ended up `Failed`
    pub fn any_failed(&self, components: &[&str]) -> bool {
        components
            .iter()
            .any(|c| self.get(c) == Some(&ComponentState::Failed))
    }

    /// One line, e.g. `camera=Stopped capture=Failed`
    pub fn summary(&self) -> String {
        self.states
            .iter()
            .map(|(name, state)| format!("{}={:?}", name, state))
            .collect::<Vec<_>>()
            .join(" ")
    }
}
