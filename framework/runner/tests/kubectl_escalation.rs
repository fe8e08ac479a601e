#![cfg(unix)]

use std::os::unix::fs::PermissionsExt as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chaos_tunnel_core::prelude::{ChaosError, ManualClock, PipelineLog, Seconds};
use chaos_tunnel_faults::prelude::{FaultKind, FaultSpecBuilder};
use chaos_tunnel_runner::prelude::{
    EscalationPlan, EscalationStepper, FaultController, KubectlBackend,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

/// A kubectl that records every call and fails applies of `reject` if given.
fn fake_kubectl(dir: &Path, reject: Option<&str>) -> PathBuf {
    let path = dir.join("kubectl");
    let reject_check = match reject {
        Some(name) => format!(
            "if [ \"$1\" = apply ] && grep -q 'name: {name}$' {stdin}; then echo 'admission webhook denied' >&2; exit 1; fi\n",
            stdin = dir.join("stdin.txt").display()
        ),
        None => String::new(),
    };
    let script = format!(
        "#!/bin/sh\necho \"$@\" >> {args}\nif [ \"$1\" = apply ]; then cat > {stdin}; cat {stdin} >> {applied}; fi\n{reject_check}exit 0\n",
        args = dir.join("args.txt").display(),
        stdin = dir.join("stdin.txt").display(),
        applied = dir.join("applied.txt").display(),
    );
    std::fs::write(&path, script).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

fn calls(dir: &Path) -> Vec<String> {
    std::fs::read_to_string(dir.join("args.txt"))
        .unwrap()
        .lines()
        .map(|line| line.to_string())
        .collect()
}

fn memory_template() -> FaultSpecBuilder {
    FaultSpecBuilder::new(FaultKind::Memory, "carts")
        .duration(Seconds(30))
        .memory_size("20MB")
}

#[test]
fn escalation_deletes_each_step_before_the_next() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = TempDir::new().unwrap();
    let log = PipelineLog::open(dir.path().join("pipeline.log")).unwrap();
    let backend = KubectlBackend::new(fake_kubectl(dir.path(), None)).with_log(log.clone());
    let clock = Arc::new(ManualClock::starting_at(1_762_691_400));
    let controller = FaultController::new(Arc::new(backend), clock.clone()).with_log(log);
    let plan = EscalationPlan::new(20, 150, 3, Seconds(30)).unwrap();

    let record = EscalationStepper::new(&controller)
        .run(&plan, &memory_template())
        .unwrap();

    assert_eq!(record.started_at(), 1_762_691_400);
    assert_eq!(record.requested_duration(), Seconds(90));

    let delete = |step: u32| {
        format!("delete stresschaos carts-memory-stress-s{step} -n sock-shop --ignore-not-found")
    };
    assert_eq!(
        calls(dir.path()),
        vec![
            delete(1),
            "apply -f -".to_string(),
            delete(1),
            delete(2),
            "apply -f -".to_string(),
            delete(2),
            delete(3),
            "apply -f -".to_string(),
            delete(3),
        ]
    );

    let applied = std::fs::read_to_string(dir.path().join("applied.txt")).unwrap();
    let sizes = applied
        .lines()
        .filter(|line| line.trim_start().starts_with("size:"))
        .map(|line| line.trim().to_string())
        .collect::<Vec<_>>();
    assert_eq!(sizes, vec!["size: 20MB", "size: 85MB", "size: 150MB"]);

    let log = std::fs::read_to_string(dir.path().join("pipeline.log")).unwrap();
    assert!(log.contains("[inject] stresschaos/sock-shop/carts-memory-stress-s1 took effect at 1762691400"));
}

#[test]
fn rejected_step_is_cleaned_and_stops_the_escalation() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = TempDir::new().unwrap();
    let backend = KubectlBackend::new(fake_kubectl(dir.path(), Some("carts-memory-stress-s2")));
    let clock = Arc::new(ManualClock::starting_at(0));
    let controller = FaultController::new(Arc::new(backend), clock.clone());
    let plan = EscalationPlan::new(20, 150, 3, Seconds(30)).unwrap();

    let result = EscalationStepper::new(&controller).run(&plan, &memory_template());

    match result {
        Err(ChaosError::ApplyError { name, reason }) => {
            assert_eq!(name, "carts-memory-stress-s2");
            assert!(reason.contains("admission webhook denied"));
        }
        other => panic!("expected ApplyError, got {other:?}"),
    }

    let calls = calls(dir.path());
    assert_eq!(calls.last().map(String::as_str), Some(
        "delete stresschaos carts-memory-stress-s2 -n sock-shop --ignore-not-found"
    ));
    assert!(!calls.iter().any(|call| call.contains("-s3")));
    // Only step 1 was waited for
    assert_eq!(clock.sleeps().len(), 1);
}
