use std::sync::Arc;
use std::time::Duration;

use guise::{
    Backoff, BoringEngine, Controller, Error, Profile, ProfileRegistry, ProtocolVersion,
    RegistryHandle, RequestIntent, RetryPolicy, Timeouts, Validator, ValidatorConfig,
};

mod helpers;
use helpers::mock_server::{MockHttpServer, Reply};
use helpers::scripted_engine::{ScriptedEngine, Step};

fn registry(names: &[&str]) -> ProfileRegistry {
    ProfileRegistry::from_profiles(names.iter().map(|name| {
        Profile::builder(*name)
            .header("User-Agent", format!("agent-{}", name))
            .build()
            .unwrap()
    }))
    .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_independent_operations_run_concurrently() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("guise=debug")
        .with_test_writer()
        .try_init();

    let server = MockHttpServer::new().await.unwrap();
    let url = server.url();
    let requests = server.requests();
    let _handle = server.start();

    let controller = Controller::new(
        BoringEngine::new().with_tcp_fingerprinting(false),
        ProfileRegistry::builtin(),
    );
    let names: Vec<String> = controller
        .registry()
        .list_names()
        .into_iter()
        .map(String::from)
        .collect();

    let mut tasks = Vec::new();
    for name in &names {
        let controller = controller.clone();
        let intent = RequestIntent::get(format!("{}/{}", url, name)).profile(name.clone());
        tasks.push(tokio::spawn(async move {
            controller
                .run::<&str>(&intent, &[], &RetryPolicy::new(1))
                .await
        }));
    }

    for (name, task) in names.iter().zip(tasks) {
        let outcome = task.await.unwrap().unwrap();
        assert_eq!(outcome.response.profile(), name.as_str());
        assert_eq!(outcome.attempts.len(), 1);
    }

    // Every request carried the identity of the operation that sent it
    let registry = controller.registry();
    let seen = requests.lock().unwrap().clone();
    assert_eq!(seen.len(), names.len());
    for request in seen {
        let name = request
            .request_line
            .split(' ')
            .nth(1)
            .unwrap()
            .trim_start_matches('/')
            .to_string();
        let profile = registry.lookup(&name).unwrap();
        assert_eq!(request.header("user-agent"), profile.user_agent());
    }
}

#[tokio::test(start_paused = true)]
async fn test_publish_does_not_disturb_running_operation() {
    let engine = ScriptedEngine::new().script("A", [Step::Hang]);
    let handle = Arc::new(RegistryHandle::new(registry(&["A", "B"])));
    let controller = Controller::with_dispatcher(
        guise::Dispatcher::new(engine.clone()),
        Arc::clone(&handle),
    );

    let running = {
        let controller = controller.clone();
        tokio::spawn(async move {
            let intent = RequestIntent::get("https://target.test/")
                .timeouts(Timeouts::new(Duration::from_secs(5)));
            controller
                .run(&intent, &["A", "B"], &RetryPolicy::new(2))
                .await
        })
    };

    while engine.bound().is_empty() {
        tokio::task::yield_now().await;
    }
    handle.publish(registry(&["A", "Z"]));

    // The running operation still rotates onto B from its snapshot
    let outcome = running.await.unwrap().unwrap();
    assert_eq!(outcome.attempts.profiles(), vec!["A", "B"]);

    // New operations see the published registry
    let err = controller
        .run(&RequestIntent::get("https://target.test/"), &["B"], &RetryPolicy::new(1))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnknownProfile(ref name) if name == "B"));
    assert!(controller.registry().contains("Z"));
}

#[test]
fn test_snapshots_are_never_half_updated() {
    let first: Vec<String> = (0..8).map(|i| format!("first{}", i)).collect();
    let second: Vec<String> = (0..8).map(|i| format!("second{}", i)).collect();
    let build = |names: &[String]| {
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        registry(&names)
    };
    let handle = RegistryHandle::new(build(&first));

    std::thread::scope(|s| {
        s.spawn(|| {
            for i in 0..200 {
                let names = if i % 2 == 0 { &second } else { &first };
                handle.publish(build(names));
            }
        });
        for _ in 0..4 {
            s.spawn(|| {
                for _ in 0..500 {
                    let snapshot = handle.snapshot();
                    let names = snapshot.list_names();
                    assert_eq!(names.len(), 8);
                    let prefix = if names[0].starts_with("first") { "first" } else { "second" };
                    assert!(names.iter().all(|n| n.starts_with(prefix)));
                }
            });
        }
    });
}

fn plain_registry(user_agent: &str) -> ProfileRegistry {
    ProfileRegistry::from_profiles([Profile::builder("plain")
        .protocols(&[ProtocolVersion::Http1_1])
        .header("User-Agent", user_agent)
        .header("Accept", "application/json")
        .build()
        .unwrap()])
    .unwrap()
}

#[tokio::test]
async fn test_publish_during_validation_compares_dispatched_profile() {
    let server = MockHttpServer::new()
        .await
        .unwrap()
        .with_replies([Reply::Stall]);
    let url = format!("{}/api/all", server.url());
    let requests = server.requests();
    let _handle = server.start();

    let handle = Arc::new(RegistryHandle::new(plain_registry("guise-probe/1.0")));
    let controller = Controller::with_dispatcher(
        guise::Dispatcher::new(BoringEngine::new().with_tcp_fingerprinting(false)),
        Arc::clone(&handle),
    );
    let config = ValidatorConfig::default()
        .probe_url(url)
        .timeouts(Timeouts::new(Duration::from_millis(300)))
        .max_attempts(2)
        .backoff(Backoff::None);
    let validator = Validator::new(controller, config);

    let running = {
        let validator = validator.clone();
        tokio::spawn(async move { validator.validate_report("plain").await })
    };
    while requests.lock().unwrap().is_empty() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    handle.publish(plain_registry("guise-probe/2.0"));

    // The retry and the comparison both use the snapshot the run started with
    let report = running.await.unwrap().unwrap();
    assert!(report.result.is_consistent(), "got {:?}", report.result);
    assert_eq!(
        report.observation.user_agent.known().map(String::as_str),
        Some("guise-probe/1.0")
    );
    assert_eq!(report.attempts.profiles(), vec!["plain", "plain"]);

    let report = validator.validate_report("plain").await.unwrap();
    assert!(report.result.is_consistent(), "got {:?}", report.result);
    assert_eq!(
        report.observation.user_agent.known().map(String::as_str),
        Some("guise-probe/2.0")
    );
}
