use herald_macros::component;
use herald_node::container::Container;

#[derive(Default, Clone)]
struct Led {
    on: bool,
}

#[component(provides = "led.on", name = "led")]
impl Led {
    #[validate]
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

#[test]
fn component_attribute_registers_a_descriptor() {
    let container = Container::new();
    container.register_inventory();
    // "led" provides "led.on" with no requirements, so it starts inactive
    // until something asks for it — but registration itself must have
    // happened for the name to be known at all.
    assert!(!container.is_active("led"));
    container.add_service("herald.directory", "peer-x", "service_0");
    assert!(!container.is_active("led"), "led has no requirement on herald.directory");
}
