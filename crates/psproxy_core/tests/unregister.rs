use psproxy_core::{
    Fault, Guid, InMemoryComponent, InMemoryRuntime, ProxyDescriptorTable, ProxyFileEntry,
    ProxyRegistrar,
};

const C1: Guid = Guid::from_fields(0xC1, 0, 0, [0; 8]);
const PRIOR: Guid = Guid::from_fields(0xC0, 0, 0, [0; 8]);
const IID_A: Guid = Guid::from_fields(0xA, 0, 0, [0; 8]);
const IID_B: Guid = Guid::from_fields(0xB, 0, 0, [0; 8]);

fn registrar() -> ProxyRegistrar<InMemoryRuntime> {
    let runtime = InMemoryRuntime::new();
    runtime.install(
        "sample",
        InMemoryComponent::new(
            C1,
            ProxyDescriptorTable::new(vec![ProxyFileEntry::from_pairs([
                (IID_A, "IA"),
                (IID_B, "IB"),
            ])]),
        ),
    );
    ProxyRegistrar::new(runtime)
}

#[test]
fn unregister_without_record_is_a_no_op() {
    let mut registrar = registrar();

    assert!(!registrar.unregister(None));
    assert_eq!(registrar.runtime().calls(), 0);
}

#[test]
fn revoke_failure_reports_false_but_still_restores_and_consumes() {
    let mut registrar = registrar();
    registrar.runtime().seed_ps_clsid(IID_A, PRIOR);
    let record = registrar.register("sample").expect("register");
    registrar.runtime().inject(Fault::RevokeClass);

    assert!(!registrar.unregister(record));

    let runtime = registrar.runtime();
    assert_eq!(runtime.ps_clsid(IID_A), Some(PRIOR));
    assert_eq!(runtime.ps_clsid(IID_B), None);
    assert_eq!(runtime.free_unused_library_calls(), 0);
    assert!(!registrar.is_registered(C1));
}

#[test]
fn restore_failure_does_not_stop_remaining_restores_or_revoke() {
    let mut registrar = registrar();
    registrar.runtime().seed_ps_clsid(IID_A, PRIOR);
    registrar.runtime().seed_ps_clsid(IID_B, PRIOR);
    let record = registrar.register("sample").expect("register");
    registrar.runtime().inject(Fault::PsClsidUpdate(IID_A));

    assert!(registrar.unregister(record));

    let runtime = registrar.runtime();
    assert_eq!(runtime.ps_clsid(IID_A), Some(C1));
    assert_eq!(runtime.ps_clsid(IID_B), Some(PRIOR));
    assert!(!runtime.is_class_registered(C1));
    assert_eq!(runtime.free_unused_library_calls(), 1);
}

#[test]
fn unregister_touches_only_captured_interfaces() {
    let mut registrar = registrar();
    let unrelated = Guid::from_fields(0xF, 0, 0, [0; 8]);
    registrar.runtime().seed_ps_clsid(unrelated, PRIOR);

    let record = registrar.register("sample").expect("register");
    let calls_before = registrar.runtime().calls();
    assert!(registrar.unregister(record));

    // Two restores, one revoke, one free-unused-libraries.
    assert_eq!(registrar.runtime().calls() - calls_before, 4);
    assert_eq!(registrar.runtime().ps_clsid(unrelated), Some(PRIOR));
}
