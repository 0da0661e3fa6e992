use super::PathId;
use std::fmt;
use std::sync::Arc;

type Read<Root, Value> = dyn Fn(&Root, &mut dyn FnMut(&Value)) + Send + Sync;
type Write<Root, Value> = dyn Fn(&mut Root, &mut dyn FnMut(&mut Value)) + Send + Sync;

/// A statically typed, composable accessor from `Root` to one of its parts.
///
/// Accessors visit the value in place instead of returning references, which
/// lets a path substitute a value that is not stored in `Root` (see
/// [`KeyPath::unwrap_or`]). Every visitor is called exactly once.
///
/// # Examples
///
/// ```
/// use statebox::key_path;
///
/// #[derive(Clone, Default)]
/// struct Profile { name: String }
/// #[derive(Clone, Default)]
/// struct App { profile: Profile }
///
/// let name = key_path!(App => profile.name);
/// let mut app = App::default();
/// name.set(&mut app, "Ada".to_string());
/// assert_eq!(name.get(&app), "Ada");
/// ```
pub struct KeyPath<Root, Value> {
    id: PathId,
    read: Arc<Read<Root, Value>>,
    write: Arc<Write<Root, Value>>,
}

impl<Root, Value> Clone for KeyPath<Root, Value> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            read: Arc::clone(&self.read),
            write: Arc::clone(&self.write),
        }
    }
}

impl<Root, Value> fmt::Debug for KeyPath<Root, Value> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("KeyPath").field(&self.id).finish()
    }
}

impl<Root: 'static, Value: 'static> KeyPath<Root, Value> {
    /// Build a path from a getter and a mutable getter.
    ///
    /// `id` names the path for scope caching; two paths with the same id are
    /// assumed to address the same part.
    pub fn new<G, M>(id: impl Into<PathId>, get: G, get_mut: M) -> Self
    where
        G: for<'a> Fn(&'a Root) -> &'a Value + Send + Sync + 'static,
        M: for<'a> Fn(&'a mut Root) -> &'a mut Value + Send + Sync + 'static,
    {
        let read: Arc<Read<Root, Value>> =
            Arc::new(move |root: &Root, visit: &mut dyn FnMut(&Value)| visit(get(root)));
        let write: Arc<Write<Root, Value>> =
            Arc::new(move |root: &mut Root, visit: &mut dyn FnMut(&mut Value)| {
                visit(get_mut(root))
            });
        Self {
            id: id.into(),
            read,
            write,
        }
    }

    pub fn id(&self) -> &PathId {
        &self.id
    }

    /// Extend this path with another one rooted at its value.
    pub fn append<Next: 'static>(&self, next: &KeyPath<Value, Next>) -> KeyPath<Root, Next> {
        let (outer_read, inner_read) = (Arc::clone(&self.read), Arc::clone(&next.read));
        let (outer_write, inner_write) = (Arc::clone(&self.write), Arc::clone(&next.write));
        let read: Arc<Read<Root, Next>> =
            Arc::new(move |root: &Root, visit: &mut dyn FnMut(&Next)| {
                outer_read(root, &mut |value: &Value| inner_read(value, &mut *visit))
            });
        let write: Arc<Write<Root, Next>> =
            Arc::new(move |root: &mut Root, visit: &mut dyn FnMut(&mut Next)| {
                outer_write(root, &mut |value: &mut Value| inner_write(value, &mut *visit))
            });
        KeyPath {
            id: self.id.append(&next.id),
            read,
            write,
        }
    }

    /// Visit the value in `root` with `f`.
    pub fn with<T>(&self, root: &Root, f: impl FnOnce(&Value) -> T) -> T {
        let mut f = Some(f);
        let mut out = None;
        (self.read)(root, &mut |value: &Value| {
            if let Some(f) = f.take() {
                out = Some(f(value));
            }
        });
        out.unwrap_or_else(|| unreachable!("key path `{}` skipped its visitor", self.id))
    }

    /// Visit the value in `root` mutably with `f`.
    pub fn with_mut<T>(&self, root: &mut Root, f: impl FnOnce(&mut Value) -> T) -> T {
        let mut f = Some(f);
        let mut out = None;
        (self.write)(root, &mut |value: &mut Value| {
            if let Some(f) = f.take() {
                out = Some(f(value));
            }
        });
        out.unwrap_or_else(|| unreachable!("key path `{}` skipped its visitor", self.id))
    }

    pub fn get(&self, root: &Root) -> Value
    where
        Value: Clone,
    {
        self.with(root, Value::clone)
    }

    pub fn set(&self, root: &mut Root, value: Value) {
        self.with_mut(root, move |slot| *slot = value);
    }
}

impl<Root: 'static> KeyPath<Root, Root> {
    /// The path from a value to itself.
    pub fn identity() -> Self {
        Self::new(PathId::root(), |root: &Root| root, |root: &mut Root| root)
    }
}

impl<Root: 'static, Member> KeyPath<Root, Option<Member>>
where
    Member: Clone + Send + Sync + 'static,
{
    /// Narrow an optional member to its wrapped value, reading `default` while
    /// the member is `None` and writing `Some(..)` back on mutation.
    pub fn unwrap_or(&self, default: Member) -> KeyPath<Root, Member> {
        let inner_read = Arc::clone(&self.read);
        let inner_write = Arc::clone(&self.write);
        let fallback = default.clone();
        let read: Arc<Read<Root, Member>> =
            Arc::new(move |root: &Root, visit: &mut dyn FnMut(&Member)| {
                inner_read(root, &mut |member: &Option<Member>| match member {
                    Some(member) => visit(member),
                    None => visit(&fallback),
                })
            });
        let write: Arc<Write<Root, Member>> =
            Arc::new(move |root: &mut Root, visit: &mut dyn FnMut(&mut Member)| {
                inner_write(root, &mut |member: &mut Option<Member>| {
                    visit(member.get_or_insert_with(|| default.clone()))
                })
            });
        KeyPath {
            id: self.id.append(&PathId::from("some")),
            read,
            write,
        }
    }
}
