use super::PathId;
use std::fmt;
use std::sync::Arc;

type Embed<Root, Value> = dyn Fn(Value) -> Root + Send + Sync;
type Extract<Root, Value> = dyn for<'a> Fn(&'a Root) -> Option<&'a Value> + Send + Sync;
type ExtractMut<Root, Value> = dyn for<'a> Fn(&'a mut Root) -> Option<&'a mut Value> + Send + Sync;
type IntoValue<Root, Value> = dyn Fn(Root) -> Result<Value, Root> + Send + Sync;

/// A statically typed accessor from a sum type to the payload of one case.
///
/// Used in both directions: stores embed child actions into parent actions,
/// and scoped stores extract the child state of an enum-cased parent.
/// The [`case_path!`](crate::case_path) macro builds one for a tuple variant.
pub struct CasePath<Root, Value> {
    id: PathId,
    embed: Arc<Embed<Root, Value>>,
    extract: Arc<Extract<Root, Value>>,
    extract_mut: Arc<ExtractMut<Root, Value>>,
    into_value: Arc<IntoValue<Root, Value>>,
}

impl<Root, Value> Clone for CasePath<Root, Value> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            embed: Arc::clone(&self.embed),
            extract: Arc::clone(&self.extract),
            extract_mut: Arc::clone(&self.extract_mut),
            into_value: Arc::clone(&self.into_value),
        }
    }
}

impl<Root, Value> fmt::Debug for CasePath<Root, Value> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CasePath").field(&self.id).finish()
    }
}

fn extractor<Root, Value, F>(f: F) -> Arc<Extract<Root, Value>>
where
    F: for<'a> Fn(&'a Root) -> Option<&'a Value> + Send + Sync + 'static,
{
    Arc::new(f)
}

fn extractor_mut<Root, Value, F>(f: F) -> Arc<ExtractMut<Root, Value>>
where
    F: for<'a> Fn(&'a mut Root) -> Option<&'a mut Value> + Send + Sync + 'static,
{
    Arc::new(f)
}

impl<Root: 'static, Value: 'static> CasePath<Root, Value> {
    pub fn new<E, X, M, I>(
        id: impl Into<PathId>,
        embed: E,
        extract: X,
        extract_mut: M,
        into_value: I,
    ) -> Self
    where
        E: Fn(Value) -> Root + Send + Sync + 'static,
        X: for<'a> Fn(&'a Root) -> Option<&'a Value> + Send + Sync + 'static,
        M: for<'a> Fn(&'a mut Root) -> Option<&'a mut Value> + Send + Sync + 'static,
        I: Fn(Root) -> Result<Value, Root> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            embed: Arc::new(embed),
            extract: Arc::new(extract),
            extract_mut: Arc::new(extract_mut),
            into_value: Arc::new(into_value),
        }
    }

    pub fn id(&self) -> &PathId {
        &self.id
    }

    pub fn embed(&self, value: Value) -> Root {
        (self.embed)(value)
    }

    pub fn extract<'a>(&self, root: &'a Root) -> Option<&'a Value> {
        (self.extract)(root)
    }

    pub fn extract_mut<'a>(&self, root: &'a mut Root) -> Option<&'a mut Value> {
        (self.extract_mut)(root)
    }

    /// Take the payload out of `root`, handing `root` back if it is another case.
    pub fn try_into_value(&self, root: Root) -> Result<Value, Root> {
        (self.into_value)(root)
    }

    pub fn matches(&self, root: &Root) -> bool {
        self.extract(root).is_some()
    }

    /// Extend this case with a case of its payload.
    pub fn append<Next: 'static>(&self, next: &CasePath<Value, Next>) -> CasePath<Root, Next> {
        let (outer_embed, inner_embed) = (Arc::clone(&self.embed), Arc::clone(&next.embed));
        let (outer_extract, inner_extract) =
            (Arc::clone(&self.extract), Arc::clone(&next.extract));
        let (outer_mut, inner_mut) =
            (Arc::clone(&self.extract_mut), Arc::clone(&next.extract_mut));
        let (outer_into, inner_into) = (
            Arc::clone(&self.into_value),
            Arc::clone(&next.into_value),
        );
        let rewrap = Arc::clone(&self.embed);
        CasePath {
            id: self.id.append(&next.id),
            embed: Arc::new(move |value: Next| outer_embed(inner_embed(value))),
            extract: extractor(move |root: &Root| {
                outer_extract(root).and_then(|value| inner_extract(value))
            }),
            extract_mut: extractor_mut(move |root: &mut Root| {
                outer_mut(root).and_then(|value| inner_mut(value))
            }),
            into_value: Arc::new(move |root: Root| match outer_into(root) {
                Ok(value) => inner_into(value).map_err(|value| rewrap(value)),
                Err(root) => Err(root),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    enum Leaf {
        Tick,
        Set(u8),
    }

    #[derive(Clone, Debug, PartialEq)]
    enum Branch {
        Leaf(Leaf),
        Other(String),
    }

    fn leaf() -> CasePath<Branch, Leaf> {
        crate::case_path!(Branch::Leaf)
    }

    fn set() -> CasePath<Leaf, u8> {
        crate::case_path!(Leaf::Set)
    }

    #[test]
    fn embed_and_extract() {
        let path = leaf();
        let root = path.embed(Leaf::Tick);
        assert_eq!(root, Branch::Leaf(Leaf::Tick));
        assert_eq!(path.extract(&root), Some(&Leaf::Tick));
        assert!(path.extract(&Branch::Other("x".into())).is_none());
    }

    #[test]
    fn extract_mut_edits_in_place() {
        let path = leaf();
        let mut root = Branch::Leaf(Leaf::Tick);
        if let Some(value) = path.extract_mut(&mut root) {
            *value = Leaf::Set(2);
        }
        assert_eq!(root, Branch::Leaf(Leaf::Set(2)));
    }

    #[test]
    fn try_into_value_hands_back_other_cases() {
        let path = leaf();
        assert_eq!(path.try_into_value(Branch::Leaf(Leaf::Tick)), Ok(Leaf::Tick));
        assert_eq!(
            path.try_into_value(Branch::Other("y".into())),
            Err(Branch::Other("y".into()))
        );
    }

    #[test]
    fn append_reaches_nested_payloads() {
        let path = leaf().append(&set());
        assert_eq!(path.embed(7), Branch::Leaf(Leaf::Set(7)));
        assert_eq!(path.extract(&Branch::Leaf(Leaf::Set(4))), Some(&4));
        assert_eq!(path.extract(&Branch::Leaf(Leaf::Tick)), None);
        assert_eq!(
            path.try_into_value(Branch::Leaf(Leaf::Tick)),
            Err(Branch::Leaf(Leaf::Tick))
        );
        assert!(path.id().as_str().contains("Set"));
    }
}
