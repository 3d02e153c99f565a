//! 引用解析实现的集成测试

use di_abstractions::{
    as_client_proxy, cast, scopelet_instance, scopelet_type_for, Bean, ClientProxier, Creation,
    Factory, Id, Instance, InstanceIdentity, InstanceManager, LambdaFactory, Qualifier,
    ReferenceConfig, Scope, ScopeId, Scopelet, ScopeletFactory, Scopes, Selector,
};
use di_impl::{
    ContextualScopelet, DefaultBeanCatalog, DefaultClientProxier, DefaultDestructorTree,
    DefaultInstanceManager, ForwardingClientProxy, ForwardingProxyStrategy, NoneScopelet,
    Request, SingletonScopelet,
};
use infrastructure_common::{ReferenceError, ReferenceResult};
use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// 会话数据，位于常规作用域
struct Session {
    serial: usize,
}

/// 持有会话引用的服务，位于依赖作用域
struct Greeter {
    session: Instance,
}

struct Config;

fn request_with(
    instance_manager: DefaultInstanceManager,
    scopes: Scopes,
) -> (Request, Arc<DefaultInstanceManager>) {
    let instance_manager = Arc::new(instance_manager);
    let proxier: Arc<dyn ClientProxier> = Arc::new(DefaultClientProxier::new(
        scopes,
        Arc::new(ForwardingProxyStrategy),
    ));
    let request = Request::new(
        instance_manager.clone(),
        proxier,
        Arc::new(DefaultDestructorTree::new()),
        Arc::new(instance_manager.config().clone()),
    );
    (request, instance_manager)
}

fn counting_bean<T, F>(id: Id, counter: &Arc<AtomicUsize>, make: F) -> Bean
where
    T: Send + Sync + 'static,
    F: Fn(usize) -> T + Send + Sync + 'static,
{
    let counter = Arc::clone(counter);
    Bean::with_factory(
        id,
        LambdaFactory::new(move |_: &dyn Creation| -> ReferenceResult<Instance> {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(Arc::new(make(n)))
        }),
    )
}

/// 延迟构造单例作用域解析器并记录构造次数的工厂
struct LazySingletonScopelet {
    scopelet: OnceCell<Arc<dyn Scopelet>>,
    constructions: Arc<AtomicUsize>,
}

impl LazySingletonScopelet {
    fn get(&self) -> Arc<dyn Scopelet> {
        self.scopelet
            .get_or_init(|| {
                self.constructions.fetch_add(1, Ordering::SeqCst);
                Arc::new(SingletonScopelet::new())
            })
            .clone()
    }
}

impl Factory for LazySingletonScopelet {
    fn create(&self, _creation: &dyn Creation) -> ReferenceResult<Instance> {
        Ok(scopelet_instance(self.get()))
    }

    fn scopelet(&self) -> Option<Arc<dyn Scopelet>> {
        Some(self.get())
    }
}

#[test]
fn test_singleton_resolved_once_through_lazy_scopelet() {
    let constructions = Arc::new(AtomicUsize::new(0));
    let scopelet_bean = Bean::with_factory(
        Id::new(
            [scopelet_type_for(&ScopeId::SINGLETON)],
            [Qualifier::Scope(ScopeId::SINGLETON)],
            ScopeId::SINGLETON,
        ),
        LazySingletonScopelet {
            scopelet: OnceCell::new(),
            constructions: Arc::clone(&constructions),
        },
    );
    let created = Arc::new(AtomicUsize::new(0));
    let config_bean = counting_bean(Id::of::<Config>(ScopeId::SINGLETON), &created, |_| Config);

    let catalog = DefaultBeanCatalog::new([scopelet_bean, config_bean]);
    let (request, _) = request_with(
        DefaultInstanceManager::new(Arc::new(catalog), ReferenceConfig::default()),
        Scopes::builtin(),
    );

    let first = request.reference(&Selector::of::<Config>()).unwrap();
    let second = request.reference(&Selector::of::<Config>()).unwrap();
    assert_eq!(InstanceIdentity::of(&first), InstanceIdentity::of(&second));
    assert_eq!(created.load(Ordering::SeqCst), 1);
    assert_eq!(constructions.load(Ordering::SeqCst), 1);
}

/// 常规作用域装配：会话在 "session" 作用域，问候服务依赖会话
struct NormalScopeFixture {
    request: Request,
    scopelet: Arc<ContextualScopelet>,
    sessions: Arc<AtomicUsize>,
    session_id: Id,
}

fn normal_scope_fixture() -> NormalScopeFixture {
    let session_scope = ScopeId::new("session");
    let scopelet = Arc::new(ContextualScopelet::new(session_scope.clone()));
    let sessions = Arc::new(AtomicUsize::new(0));
    let session_id = Id::of::<Session>(session_scope.clone());
    let session_bean = counting_bean(session_id.clone(), &sessions, |serial| Session { serial });
    let greeter_bean = Bean::with_factory(
        Id::of::<Greeter>(ScopeId::NONE),
        LambdaFactory::new(|creation: &dyn Creation| -> ReferenceResult<Instance> {
            let session = creation.reference(&Selector::of::<Session>())?;
            Ok(Arc::new(Greeter { session }))
        }),
    );

    let (request, _) = request_with(
        DefaultInstanceManager::with_beans(
            [
                ScopeletFactory::bean(scopelet.clone()),
                session_bean,
                greeter_bean,
            ],
            ReferenceConfig::default(),
        ),
        Scopes::builtin().with(Scope::new(session_scope, true)),
    );
    NormalScopeFixture {
        request,
        scopelet,
        sessions,
        session_id,
    }
}

fn serial_of(session: &Instance) -> ReferenceResult<usize> {
    Ok(cast::<Session>(session)?.serial)
}

#[test]
fn test_normal_scope_dependency_is_proxied_lazily() {
    let fixture = normal_scope_fixture();

    let greeter = fixture
        .request
        .reference_as::<Greeter>(&Selector::of::<Greeter>())
        .unwrap();
    assert!(as_client_proxy(&greeter.session).is_some());
    assert_eq!(fixture.sessions.load(Ordering::SeqCst), 0);

    assert_eq!(serial_of(&greeter.session).unwrap(), 1);
    assert_eq!(serial_of(&greeter.session).unwrap(), 1);
    assert_eq!(fixture.sessions.load(Ordering::SeqCst), 1);

    let proxy = as_client_proxy(&greeter.session).unwrap();
    let forwarding = proxy
        .as_any()
        .downcast_ref::<ForwardingClientProxy>()
        .unwrap();
    assert_eq!(forwarding.with(|s: &Session| s.serial).unwrap(), 1);
}

#[test]
fn test_proxy_observes_fresh_instance_after_removal() {
    let fixture = normal_scope_fixture();
    let greeter = fixture
        .request
        .reference_as::<Greeter>(&Selector::of::<Greeter>())
        .unwrap();
    assert_eq!(serial_of(&greeter.session).unwrap(), 1);

    assert!(fixture.scopelet.remove(&fixture.session_id).unwrap());
    assert!(!fixture.scopelet.remove(&fixture.session_id).unwrap());
    assert_eq!(serial_of(&greeter.session).unwrap(), 2);

    // 通过请求移除同样经过作用域链
    assert!(fixture.request.remove(&fixture.session_id).unwrap());
    assert_eq!(serial_of(&greeter.session).unwrap(), 3);
}

#[test]
fn test_proxy_fails_while_scope_is_inactive() {
    let fixture = normal_scope_fixture();
    let greeter = fixture
        .request
        .reference_as::<Greeter>(&Selector::of::<Greeter>())
        .unwrap();
    assert_eq!(serial_of(&greeter.session).unwrap(), 1);

    fixture.scopelet.deactivate().unwrap();
    assert!(matches!(
        serial_of(&greeter.session),
        Err(ReferenceError::InactiveScope { .. })
    ));

    fixture.scopelet.activate();
    assert_eq!(serial_of(&greeter.session).unwrap(), 2);
}

#[test]
fn test_scope_governance_cycle_is_configuration_error() {
    let a = ScopeId::new("a");
    let b = ScopeId::new("b");
    let created = Arc::new(AtomicUsize::new(0));
    let beans = [
        ScopeletFactory::bean(Arc::new(ContextualScopelet::with_scope(
            Scope::new(a.clone(), false),
            b.clone(),
        ))),
        ScopeletFactory::bean(Arc::new(ContextualScopelet::with_scope(
            Scope::new(b, false),
            a.clone(),
        ))),
        counting_bean(Id::of::<Config>(a), &created, |_| Config),
    ];
    let (request, _) = request_with(
        DefaultInstanceManager::with_beans(beans, ReferenceConfig::default()),
        Scopes::builtin(),
    );

    assert!(matches!(
        request.reference(&Selector::of::<Config>()),
        Err(ReferenceError::Configuration { .. })
    ));
    assert_eq!(created.load(Ordering::SeqCst), 0);
}

#[test]
fn test_scope_chain_depth_is_capped() {
    let created = Arc::new(AtomicUsize::new(0));
    let config = ReferenceConfig {
        max_scope_chain_depth: 1,
        ..ReferenceConfig::default()
    };
    // Config -> none 解析器 -> singleton 解析器，需要两层
    let (request, _) = request_with(
        DefaultInstanceManager::with_beans(
            [counting_bean(Id::of::<Config>(ScopeId::NONE), &created, |_| Config)],
            config,
        ),
        Scopes::builtin(),
    );
    assert!(matches!(
        request.reference(&Selector::of::<Config>()),
        Err(ReferenceError::Configuration { .. })
    ));
}

#[test]
fn test_unsatisfied_and_ambiguous_selectors() {
    let created = Arc::new(AtomicUsize::new(0));
    let (request, _) = request_with(
        DefaultInstanceManager::with_beans(
            [
                counting_bean(Id::of::<Config>(ScopeId::SINGLETON), &created, |_| Config),
                counting_bean(Id::of::<Config>(ScopeId::SINGLETON), &created, |_| Config),
            ],
            ReferenceConfig::default(),
        ),
        Scopes::builtin(),
    );

    assert!(matches!(
        request.reference(&Selector::of::<Session>()),
        Err(ReferenceError::Unsatisfied { .. })
    ));
    assert!(matches!(
        request.reference(&Selector::of::<Config>()),
        Err(ReferenceError::Ambiguous { .. })
    ));
    assert_eq!(request.references(&Selector::of::<Config>()).count(), 2);
}

#[test]
fn test_two_active_scopelets_for_one_scope() {
    let session = ScopeId::new("session");
    let created = Arc::new(AtomicUsize::new(0));
    let (request, manager) = request_with(
        DefaultInstanceManager::with_beans(
            [
                ScopeletFactory::bean(Arc::new(ContextualScopelet::new(session.clone()))),
                ScopeletFactory::bean(Arc::new(ContextualScopelet::new(session.clone()))),
                counting_bean(Id::of::<Config>(session.clone()), &created, |_| Config),
            ],
            ReferenceConfig::default(),
        ),
        Scopes::builtin(),
    );

    assert!(matches!(
        request.reference(&Selector::of::<Config>()),
        Err(ReferenceError::TooManyActiveScopelets { .. })
    ));
    assert!(matches!(
        manager.bean(&di_abstractions::scopelet_selector(&session)),
        Err(ReferenceError::TooManyActiveScopelets { .. })
    ));
}

#[test]
fn test_inactive_scopelet_yields_to_active_one() {
    let session = ScopeId::new("session");
    let created = Arc::new(AtomicUsize::new(0));
    let active = Arc::new(ContextualScopelet::new(session.clone()));
    let (request, _) = request_with(
        DefaultInstanceManager::with_beans(
            [
                ScopeletFactory::bean(Arc::new(
                    ContextualScopelet::new(session.clone()).with_active(false),
                )),
                ScopeletFactory::bean(active.clone()),
                counting_bean(Id::of::<Config>(session.clone()), &created, |_| Config),
            ],
            ReferenceConfig::default(),
        ),
        Scopes::builtin(),
    );

    request.reference(&Selector::of::<Config>()).unwrap();
    assert_eq!(active.len(), 1);
}

/// 记录销毁顺序的依赖作用域 bean
fn recording_bean<T: Send + Sync + 'static>(
    name: &'static str,
    log: &Arc<Mutex<Vec<&'static str>>>,
    dependency: Option<Selector>,
    make: fn() -> T,
) -> Bean {
    let log = Arc::clone(log);
    Bean::with_factory(
        Id::of::<T>(ScopeId::NONE),
        LambdaFactory::new(move |creation: &dyn Creation| -> ReferenceResult<Instance> {
            if let Some(selector) = &dependency {
                creation.reference(selector)?;
            }
            Ok(Arc::new(make()))
        })
        .with_destroy(move |_| {
            log.lock().unwrap().push(name);
            Ok(())
        }),
    )
}

#[test]
fn test_close_destroys_dependents_before_dependencies() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let (request, _) = request_with(
        DefaultInstanceManager::with_beans(
            [
                recording_bean("greeter", &log, Some(Selector::of::<Config>()), || Greeter {
                    session: Arc::new(()),
                }),
                recording_bean("config", &log, None, || Config),
            ],
            ReferenceConfig::default(),
        ),
        Scopes::builtin(),
    );

    request.reference(&Selector::of::<Greeter>()).unwrap();
    assert!(log.lock().unwrap().is_empty());

    request.close().unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["greeter", "config"]);

    request.close().unwrap();
    assert_eq!(log.lock().unwrap().len(), 2);
}

#[test]
fn test_iterator_remove_destroys_dependency_subtree() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let (request, _) = request_with(
        DefaultInstanceManager::with_beans(
            [
                recording_bean("greeter", &log, Some(Selector::of::<Config>()), || Greeter {
                    session: Arc::new(()),
                }),
                recording_bean("config", &log, None, || Config),
            ],
            ReferenceConfig::default(),
        ),
        Scopes::builtin(),
    );

    let mut references = request.references(&Selector::of::<Greeter>());
    references.next().unwrap().unwrap();
    assert!(references.remove().unwrap());
    assert_eq!(*log.lock().unwrap(), vec!["greeter", "config"]);

    request.close().unwrap();
    assert_eq!(log.lock().unwrap().len(), 2);
}

#[test]
fn test_manager_close_destroys_singletons() {
    let destroyed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&destroyed);
    let bean = Bean::with_factory(
        Id::of::<Config>(ScopeId::SINGLETON),
        LambdaFactory::new(|_: &dyn Creation| -> ReferenceResult<Instance> { Ok(Arc::new(Config)) })
            .with_destroy(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
    );
    let (request, manager) = request_with(
        DefaultInstanceManager::with_beans([bean], ReferenceConfig::default()),
        Scopes::builtin(),
    );

    request.reference(&Selector::of::<Config>()).unwrap();
    request.close().unwrap();
    assert_eq!(destroyed.load(Ordering::SeqCst), 0);

    manager.close().unwrap();
    assert_eq!(destroyed.load(Ordering::SeqCst), 1);
}

#[test]
fn test_none_scopelet_is_not_removable() {
    let scopelet = NoneScopelet::new();
    assert!(!scopelet.remove(&Id::of::<Config>(ScopeId::NONE)).unwrap());
    assert_eq!(scopelet.governing_scope_id(), &ScopeId::SINGLETON);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_singleton_resolution() {
    let created = Arc::new(AtomicUsize::new(0));
    let (request, _) = request_with(
        DefaultInstanceManager::with_beans(
            [counting_bean(
                Id::of::<Config>(ScopeId::SINGLETON),
                &created,
                |_| Config,
            )],
            ReferenceConfig::default(),
        ),
        Scopes::builtin(),
    );

    let mut handles = Vec::new();
    for _ in 0..16 {
        let request = request.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            request
                .reference(&Selector::of::<Config>())
                .map(|instance| InstanceIdentity::of(&instance))
        }));
    }

    let mut identities = Vec::new();
    for handle in handles {
        identities.push(handle.await.unwrap().unwrap());
    }
    identities.dedup();
    assert_eq!(identities.len(), 1);
    assert_eq!(created.load(Ordering::SeqCst), 1);
}

/// 会话创建时解析的依赖作用域部件
struct Part;

#[test]
fn test_normal_scope_proxy_outlives_first_request() {
    let session_scope = ScopeId::new("session");
    let scopelet = Arc::new(ContextualScopelet::new(session_scope.clone()));
    let sessions = Arc::new(AtomicUsize::new(0));
    let parts_destroyed = Arc::new(AtomicUsize::new(0));
    let session_id = Id::of::<Session>(session_scope.clone());

    let counter = Arc::clone(&sessions);
    let session_bean = Bean::with_factory(
        session_id.clone(),
        LambdaFactory::new(move |creation: &dyn Creation| -> ReferenceResult<Instance> {
            creation.reference(&Selector::of::<Part>())?;
            let serial = counter.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(Arc::new(Session { serial }))
        }),
    );
    let destroyed = Arc::clone(&parts_destroyed);
    let part_bean = Bean::with_factory(
        Id::of::<Part>(ScopeId::NONE),
        LambdaFactory::new(|_: &dyn Creation| -> ReferenceResult<Instance> { Ok(Arc::new(Part)) })
            .with_destroy(move |_| {
                destroyed.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
    );

    let instance_manager: Arc<dyn InstanceManager> = Arc::new(DefaultInstanceManager::with_beans(
        [ScopeletFactory::bean(scopelet.clone()), session_bean, part_bean],
        ReferenceConfig::default(),
    ));
    let proxier: Arc<dyn ClientProxier> = Arc::new(DefaultClientProxier::new(
        Scopes::builtin().with(Scope::new(session_scope, true)),
        Arc::new(ForwardingProxyStrategy),
    ));
    let config = Arc::new(ReferenceConfig::default());
    let open = || {
        Request::new(
            Arc::clone(&instance_manager),
            Arc::clone(&proxier),
            Arc::new(DefaultDestructorTree::new()),
            Arc::clone(&config),
        )
    };

    let first = open();
    let session = first.reference(&Selector::of::<Session>()).unwrap();
    assert_eq!(serial_of(&session).unwrap(), 1);
    first.close().unwrap();

    // 会话仍由作用域解析器保存，它的依赖不随第一个请求销毁
    assert_eq!(scopelet.len(), 1);
    assert_eq!(parts_destroyed.load(Ordering::SeqCst), 0);
    assert_eq!(serial_of(&session).unwrap(), 1);

    let second = open();
    let again = second.reference(&Selector::of::<Session>()).unwrap();
    assert_eq!(InstanceIdentity::of(&again), InstanceIdentity::of(&session));

    assert!(scopelet.remove(&session_id).unwrap());
    assert_eq!(parts_destroyed.load(Ordering::SeqCst), 1);

    // 第一个请求关闭后，代理仍能重新创建实例
    assert_eq!(serial_of(&again).unwrap(), 2);
    second.close().unwrap();
    assert_eq!(parts_destroyed.load(Ordering::SeqCst), 1);

    scopelet.close().unwrap();
    assert_eq!(parts_destroyed.load(Ordering::SeqCst), 2);
}

/// 在限定时间内完成解析，阻塞视为失败
fn resolve_within<T, F>(resolve: F) -> ReferenceResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> ReferenceResult<T> + Send + 'static,
{
    let (sender, receiver) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let _ = sender.send(resolve());
    });
    receiver
        .recv_timeout(std::time::Duration::from_secs(5))
        .expect("解析在 5 秒内没有完成")
}

struct Holder;
struct Upstream;
struct Downstream;

fn invoking_bean<T, D>(scope: &ScopeId, make: fn() -> T) -> Bean
where
    T: Send + Sync + 'static,
    D: Send + Sync + 'static,
{
    Bean::with_factory(
        Id::of::<T>(scope.clone()),
        LambdaFactory::new(move |creation: &dyn Creation| -> ReferenceResult<Instance> {
            // 构造期间调用依赖的代理
            cast::<D>(&creation.reference(&Selector::of::<D>())?)?;
            Ok(Arc::new(make()))
        }),
    )
}

#[test]
fn test_construction_cycle_through_proxies_is_reported() {
    let session_scope = ScopeId::new("session");
    let (request, _) = request_with(
        DefaultInstanceManager::with_beans(
            [
                ScopeletFactory::bean(Arc::new(ContextualScopelet::new(session_scope.clone()))),
                invoking_bean::<Holder, Holder>(&session_scope, || Holder),
                invoking_bean::<Upstream, Downstream>(&session_scope, || Upstream),
                invoking_bean::<Downstream, Upstream>(&session_scope, || Downstream),
            ],
            ReferenceConfig::default(),
        ),
        Scopes::builtin().with(Scope::new(session_scope, true)),
    );

    let holder = request.clone();
    let result = resolve_within(move || {
        let proxy = holder.reference(&Selector::of::<Holder>())?;
        cast::<Holder>(&proxy).map(|_| ())
    });
    assert!(matches!(result, Err(ReferenceError::CircularDependency { .. })));

    let result = resolve_within(move || {
        let proxy = request.reference(&Selector::of::<Upstream>())?;
        cast::<Upstream>(&proxy).map(|_| ())
    });
    assert!(matches!(result, Err(ReferenceError::CircularDependency { .. })));
}

#[test]
fn test_singleton_cycle_without_detection_is_reported() {
    let config = ReferenceConfig {
        enable_circular_dependency_detection: false,
        ..ReferenceConfig::default()
    };
    let (request, _) = request_with(
        DefaultInstanceManager::with_beans(
            [
                invoking_bean::<Upstream, Downstream>(&ScopeId::SINGLETON, || Upstream),
                invoking_bean::<Downstream, Upstream>(&ScopeId::SINGLETON, || Downstream),
            ],
            config,
        ),
        Scopes::builtin(),
    );

    let result = resolve_within(move || request.reference(&Selector::of::<Upstream>()).map(|_| ()));
    assert!(matches!(result, Err(ReferenceError::CircularDependency { .. })));
}
