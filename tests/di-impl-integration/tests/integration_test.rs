//! 引用容器的端到端集成测试

use di_abstractions::{
    as_client_proxy, cast, Bean, ClientProxy, Creation, Id, Instance, InstanceIdentity,
    InstanceSupplier, LambdaFactory, ProxyClassGenerator, ProxyConstructor, ProxySpecification,
    ProxyStrategyKind, ReferenceConfig, ScopeId, Selector,
};
use di_impl::{ContextualScopelet, ForwardingClientProxy};
use infrastructure_common::{InfrastructureError, ReferenceError, ReferenceResult};
use infrastructure_composition::{References, ReferencesBuilder};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// 会话数据，位于 "session" 作用域
struct Session {
    serial: usize,
}

/// 购物车，同样位于 "session" 作用域
struct Cart;

/// 依赖会话的服务，位于依赖作用域
struct Greeter {
    session: Instance,
}

fn session_scope() -> ScopeId {
    ScopeId::new("session")
}

fn session_bean(created: &Arc<AtomicUsize>) -> Bean {
    let created = Arc::clone(created);
    Bean::with_factory(
        Id::of::<Session>(session_scope()),
        LambdaFactory::new(move |_: &dyn Creation| -> ReferenceResult<Instance> {
            let serial = created.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(Arc::new(Session { serial }))
        }),
    )
}

fn greeter_bean() -> Bean {
    Bean::with_factory(
        Id::of::<Greeter>(ScopeId::NONE),
        LambdaFactory::new(|creation: &dyn Creation| -> ReferenceResult<Instance> {
            let session = creation.reference(&Selector::of::<Session>())?;
            Ok(Arc::new(Greeter { session }))
        }),
    )
}

fn serial_of(greeter: &Greeter) -> ReferenceResult<usize> {
    Ok(cast::<Session>(&greeter.session)?.serial)
}

fn session_builder(created: &Arc<AtomicUsize>) -> (ReferencesBuilder, Arc<ContextualScopelet>) {
    let scopelet = Arc::new(ContextualScopelet::new(session_scope()));
    let builder = References::builder()
        .scopelet(scopelet.clone())
        .bean(session_bean(created))
        .bean(greeter_bean());
    (builder, scopelet)
}

#[test]
fn test_normal_scope_reference_is_lazy_proxy() -> anyhow::Result<()> {
    let created = Arc::new(AtomicUsize::new(0));
    let (builder, _) = session_builder(&created);
    let references = builder.build()?;
    let request = references.request()?;

    let greeter = request.reference_as::<Greeter>(&Selector::of::<Greeter>())?;
    assert!(as_client_proxy(&greeter.session).is_some());
    assert_eq!(created.load(Ordering::SeqCst), 0);

    assert_eq!(serial_of(&greeter)?, 1);
    assert_eq!(serial_of(&greeter)?, 1);
    assert_eq!(created.load(Ordering::SeqCst), 1);

    // 直接请求常规作用域的 bean 同样得到同一个代理
    let direct = request.reference(&Selector::of::<Session>())?;
    assert_eq!(
        InstanceIdentity::of(&direct),
        InstanceIdentity::of(&greeter.session)
    );

    request.close()?;
    references.close()?;
    Ok(())
}

#[test]
fn test_scopelet_hand_off_between_same_scope_resolvers() -> anyhow::Result<()> {
    let created = Arc::new(AtomicUsize::new(0));
    let (builder, first) = session_builder(&created);
    let second = Arc::new(ContextualScopelet::new(session_scope()).with_active(false));
    let references = builder.scopelet(second.clone()).build()?;
    let request = references.request()?;

    let greeter = request.reference_as::<Greeter>(&Selector::of::<Greeter>())?;
    assert_eq!(serial_of(&greeter)?, 1);
    assert_eq!(first.len(), 1);

    first.deactivate()?;
    assert!(first.is_empty());
    assert!(matches!(serial_of(&greeter), Err(ReferenceError::Ambiguous { .. })));

    second.activate();
    assert_eq!(serial_of(&greeter)?, 2);
    assert_eq!(second.len(), 1);

    first.activate();
    assert!(matches!(
        serial_of(&greeter),
        Err(ReferenceError::TooManyActiveScopelets { .. })
    ));
    Ok(())
}

/// 记录生成过的代理名称的生成器
#[derive(Default)]
struct CountingGenerator {
    names: Mutex<Vec<String>>,
}

impl ProxyClassGenerator for CountingGenerator {
    fn generate(&self, specification: &ProxySpecification) -> ReferenceResult<ProxyConstructor> {
        self.names.lock().unwrap().push(specification.name().to_string());
        Ok(Arc::new(
            |id: &Id, supplier: InstanceSupplier| -> ReferenceResult<Arc<dyn ClientProxy>> {
                Ok(Arc::new(ForwardingClientProxy::new(id.clone(), supplier)))
            },
        ))
    }
}

#[test]
fn test_generating_strategy_generates_once_per_proxy_class() -> anyhow::Result<()> {
    let created = Arc::new(AtomicUsize::new(0));
    let generator = Arc::new(CountingGenerator::default());
    let (builder, _) = session_builder(&created);
    let references = builder
        .bean(Bean::with_factory(
            Id::of::<Cart>(session_scope()),
            LambdaFactory::new(|_: &dyn Creation| -> ReferenceResult<Instance> {
                Ok(Arc::new(Cart))
            }),
        ))
        .config(ReferenceConfig {
            proxy_strategy: ProxyStrategyKind::Generating,
            enable_performance_monitoring: true,
            ..ReferenceConfig::default()
        })
        .proxy_generator(generator.clone())
        .build()?;

    let request = references.request()?;
    for _ in 0..3 {
        request.reference(&Selector::of::<Session>())?;
        request.reference(&Selector::of::<Cart>())?;
    }
    let cart = request.reference(&Selector::of::<Cart>())?;
    assert!(cast::<Cart>(&cart).is_ok());

    let names = generator.names.lock().unwrap().clone();
    assert_eq!(names.len(), 2);
    assert!(names.iter().any(|name| name.ends_with("$Session")));
    assert!(names.iter().any(|name| name.ends_with("$Cart")));
    assert_eq!(references.stats().map(|s| s.proxies_created), Some(2));
    Ok(())
}

#[test]
fn test_unsupported_strategy_rejects_normal_scope() -> anyhow::Result<()> {
    let created = Arc::new(AtomicUsize::new(0));
    let (builder, _) = session_builder(&created);
    let references = builder
        .config(ReferenceConfig {
            proxy_strategy: ProxyStrategyKind::Unsupported,
            ..ReferenceConfig::default()
        })
        .build()?;

    let request = references.request()?;
    assert!(matches!(
        request.reference(&Selector::of::<Greeter>()),
        Err(ReferenceError::ProxyUnsupported { .. })
    ));
    assert_eq!(created.load(Ordering::SeqCst), 0);
    Ok(())
}

#[test]
fn test_config_file_drives_assembly() -> anyhow::Result<()> {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile()?;
    writeln!(file, "proxy_strategy = \"unsupported\"")?;
    writeln!(file, "enable_performance_monitoring = true")?;

    let created = Arc::new(AtomicUsize::new(0));
    let (builder, _) = session_builder(&created);
    let references = builder
        .with_config_file_and_prefix(file.path(), "REFERENCE_INTEGRATION")?
        .build()?;

    assert_eq!(references.config().proxy_strategy, ProxyStrategyKind::Unsupported);
    assert!(references.stats().is_some());

    let missing = References::builder().with_config_file("/nonexistent/reference.toml");
    assert!(matches!(missing, Err(InfrastructureError::ConfigError { .. })));
    Ok(())
}

#[test]
fn test_circular_dependency_and_proxy_cycle() -> anyhow::Result<()> {
    struct Left;
    struct Right;

    // 依赖作用域之间的循环无法构造
    let references = References::builder()
        .bean(Bean::with_factory(
            Id::of::<Left>(ScopeId::NONE),
            LambdaFactory::new(|creation: &dyn Creation| -> ReferenceResult<Instance> {
                creation.reference(&Selector::of::<Right>())?;
                Ok(Arc::new(Left))
            }),
        ))
        .bean(Bean::with_factory(
            Id::of::<Right>(ScopeId::NONE),
            LambdaFactory::new(|creation: &dyn Creation| -> ReferenceResult<Instance> {
                creation.reference(&Selector::of::<Left>())?;
                Ok(Arc::new(Right))
            }),
        ))
        .build()?;
    let request = references.request()?;
    assert!(matches!(
        request.reference(&Selector::of::<Left>()),
        Err(ReferenceError::CircularDependency { .. })
    ));

    // 经过代理的循环是合法的：Host 在常规作用域，Guest 持有 Host 的代理
    struct Host {
        guest: Instance,
    }
    struct Guest {
        host: Instance,
    }
    let hosts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hosts);
    let references = References::builder()
        .scopelet(Arc::new(ContextualScopelet::new(session_scope())))
        .bean(Bean::with_factory(
            Id::of::<Host>(session_scope()),
            LambdaFactory::new(move |creation: &dyn Creation| -> ReferenceResult<Instance> {
                counter.fetch_add(1, Ordering::SeqCst);
                let guest = creation.reference(&Selector::of::<Guest>())?;
                Ok(Arc::new(Host { guest }))
            }),
        ))
        .bean(Bean::with_factory(
            Id::of::<Guest>(ScopeId::NONE),
            LambdaFactory::new(|creation: &dyn Creation| -> ReferenceResult<Instance> {
                let host = creation.reference(&Selector::of::<Host>())?;
                Ok(Arc::new(Guest { host }))
            }),
        ))
        .build()?;
    let request = references.request()?;
    let guest = request.reference_as::<Guest>(&Selector::of::<Guest>())?;
    let host = cast::<Host>(&guest.host)?;
    let inner = cast::<Guest>(&host.guest)?;
    assert_eq!(
        InstanceIdentity::of(&inner.host),
        InstanceIdentity::of(&guest.host)
    );
    assert_eq!(hosts.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_share_one_proxy() -> anyhow::Result<()> {
    let created = Arc::new(AtomicUsize::new(0));
    let (builder, _) = session_builder(&created);
    let references = Arc::new(builder.build()?);

    let mut handles = Vec::new();
    for _ in 0..16 {
        let references = Arc::clone(&references);
        handles.push(tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
            let request = references.request()?;
            let greeter = request.reference_as::<Greeter>(&Selector::of::<Greeter>())?;
            let serial = serial_of(&greeter)?;
            request.close()?;
            Ok((InstanceIdentity::of(&greeter.session), serial))
        }));
    }

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await??);
    }
    results.dedup();
    assert_eq!(results.len(), 1);
    assert_eq!(created.load(Ordering::SeqCst), 1);

    references.close()?;
    Ok(())
}
