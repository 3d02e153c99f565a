//! 默认销毁器树实现

use di_abstractions::{Destructor, DestructorRegistry, DestructorTree, Instance, InstanceIdentity};
use infrastructure_common::{ReferenceError, ReferenceResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error};

/// 一条注册记录，持有实例以保证身份在注册期间有效
struct Registration {
    sequence: u64,
    _instance: Instance,
    destructor: Destructor,
}

/// 节点状态，关闭后为 `None`
struct Registrations {
    next_sequence: u64,
    entries: HashMap<InstanceIdentity, Registration>,
}

/// 默认销毁器树
///
/// 每个节点由一把互斥锁保护，锁只在读写本节点的注册表时持有，执行销毁动作前释放。
pub struct DefaultDestructorTree {
    registrations: Mutex<Option<Registrations>>,
}

impl DefaultDestructorTree {
    /// 创建新的打开节点
    pub fn new() -> Self {
        Self {
            registrations: Mutex::new(Some(Registrations {
                next_sequence: 0,
                entries: HashMap::new(),
            })),
        }
    }

    /// 创建子节点，返回具体类型
    pub fn child(&self) -> ReferenceResult<Arc<Self>> {
        let child = Arc::new(Self::new());
        let closer = Arc::clone(&child);
        if self.register(child.clone(), Box::new(move || closer.close())) {
            Ok(child)
        } else {
            Err(ReferenceError::Closed)
        }
    }
}

impl Default for DefaultDestructorTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DestructorRegistry for DefaultDestructorTree {
    fn register(&self, instance: Instance, destructor: Destructor) -> bool {
        let identity = InstanceIdentity::of(&instance);
        let mut guard = self.registrations.lock();
        let Some(registrations) = guard.as_mut() else {
            return false;
        };
        if registrations.entries.contains_key(&identity) {
            return false;
        }
        let sequence = registrations.next_sequence;
        registrations.next_sequence += 1;
        registrations.entries.insert(
            identity,
            Registration {
                sequence,
                _instance: instance,
                destructor,
            },
        );
        true
    }
}

impl DestructorTree for DefaultDestructorTree {
    fn new_child(&self) -> ReferenceResult<Arc<dyn DestructorTree>> {
        let child: Arc<dyn DestructorTree> = self.child()?;
        Ok(child)
    }

    fn remove(&self, identity: InstanceIdentity) -> Option<Destructor> {
        let removed = self
            .registrations
            .lock()
            .as_mut()
            .and_then(|registrations| registrations.entries.remove(&identity));
        removed.map(|registration| registration.destructor)
    }

    fn close(&self) -> ReferenceResult<()> {
        let Some(registrations) = self.registrations.lock().take() else {
            return Ok(());
        };

        // 后注册的先销毁
        let mut entries: Vec<Registration> = registrations.entries.into_values().collect();
        entries.sort_by(|a, b| b.sequence.cmp(&a.sequence));
        debug!("关闭销毁器树节点，执行 {} 个销毁动作", entries.len());

        let mut errors = Vec::new();
        for registration in entries {
            if let Err(e) = (registration.destructor)() {
                errors.push(e);
            }
        }

        match ReferenceError::aggregate(errors) {
            Some(e) => {
                error!("销毁动作执行失败: {}", e);
                Err(e)
            }
            None => Ok(()),
        }
    }

    fn is_closed(&self) -> bool {
        self.registrations.lock().is_none()
    }

    fn len(&self) -> usize {
        self.registrations
            .lock()
            .as_ref()
            .map_or(0, |registrations| registrations.entries.len())
    }
}
