use super::Params;
use crate::mailbox::Callback;
use crate::worker::WorkerContext;
use anyhow::Result;
use serde_json::Value;
use std::fmt;

/// Kind tag of a [`CallArg`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Callback,
    Name,
    Params,
}

/// One positional argument of [`WorkerContext::call`]; may appear in any order.
pub enum CallArg {
    Callback(Callback),
    Name(String),
    Params(Params),
}

impl CallArg {
    pub fn callback<F>(callback: F) -> Self
    where
        F: FnOnce(&WorkerContext, Result<Value>) + Send + 'static,
    {
        CallArg::Callback(Box::new(callback))
    }

    pub fn name(name: impl Into<String>) -> Self {
        CallArg::Name(name.into())
    }

    pub fn params(params: Params) -> Self {
        CallArg::Params(params)
    }

    pub fn kind(&self) -> ArgKind {
        match self {
            CallArg::Callback(_) => ArgKind::Callback,
            CallArg::Name(_) => ArgKind::Name,
            CallArg::Params(_) => ArgKind::Params,
        }
    }

    pub fn into_callback(self) -> Option<Callback> {
        match self {
            CallArg::Callback(callback) => Some(callback),
            _ => None,
        }
    }

    pub fn into_name(self) -> Option<String> {
        match self {
            CallArg::Name(name) => Some(name),
            _ => None,
        }
    }

    pub fn into_params(self) -> Option<Params> {
        match self {
            CallArg::Params(params) => Some(params),
            _ => None,
        }
    }
}

impl From<&str> for CallArg {
    fn from(name: &str) -> Self {
        CallArg::Name(name.to_owned())
    }
}

impl From<String> for CallArg {
    fn from(name: String) -> Self {
        CallArg::Name(name)
    }
}

impl From<Params> for CallArg {
    fn from(params: Params) -> Self {
        CallArg::Params(params)
    }
}

impl fmt::Debug for CallArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallArg::Callback(_) => f.write_str("Callback(..)"),
            CallArg::Name(name) => f.debug_tuple("Name").field(name).finish(),
            CallArg::Params(params) => f.debug_tuple("Params").field(params).finish(),
        }
    }
}

fn position_by_kind(index: usize, kinds: &[ArgKind], candidates: &[CallArg]) -> Option<usize> {
    candidates
        .iter()
        .enumerate()
        .filter(|(_, candidate)| kinds.contains(&candidate.kind()))
        .nth(index)
        .map(|(position, _)| position)
}

/// Returns the `index`-th (0-based) candidate whose kind is one of `kinds`, else
/// `default`.
pub fn find_by_kind<'a>(
    index: usize,
    kinds: &[ArgKind],
    default: Option<&'a CallArg>,
    candidates: &'a [CallArg],
) -> Option<&'a CallArg> {
    position_by_kind(index, kinds, candidates)
        .map(|position| &candidates[position])
        .or(default)
}

/// Removes and returns the first argument of `kind`.
pub(crate) fn take_by_kind(args: &mut Vec<CallArg>, kind: ArgKind) -> Option<CallArg> {
    position_by_kind(0, &[kind], args).map(|position| args.remove(position))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Vec<CallArg> {
        let mut params = Params::new();
        params.insert("a".into(), json!(1));
        vec![
            CallArg::name("first"),
            CallArg::callback(|_, _| {}),
            CallArg::params(params),
            CallArg::name("second"),
            CallArg::name("third"),
        ]
    }

    #[test]
    fn finds_nth_match_of_a_kind() {
        let args = sample();
        let names: Vec<_> = (0..3)
            .filter_map(|index| find_by_kind(index, &[ArgKind::Name], None, &args))
            .filter_map(|arg| match arg {
                CallArg::Name(name) => Some(name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(names, ["first", "second", "third"]);

        assert_eq!(
            find_by_kind(0, &[ArgKind::Callback], None, &args).map(CallArg::kind),
            Some(ArgKind::Callback)
        );
    }

    #[test]
    fn kind_sets_match_any_member() {
        let args = sample();
        let found = find_by_kind(2, &[ArgKind::Params, ArgKind::Name], None, &args);
        assert!(matches!(found, Some(CallArg::Name(name)) if name == "second"));
    }

    #[test]
    fn falls_back_to_default() {
        let args = sample();
        let fallback = CallArg::name("fallback");
        let found = find_by_kind(1, &[ArgKind::Params], Some(&fallback), &args);
        assert!(matches!(found, Some(CallArg::Name(name)) if name == "fallback"));
        assert!(find_by_kind(5, &[ArgKind::Name], None, &args).is_none());
    }

    #[test]
    fn take_removes_first_of_kind() {
        let mut args = sample();
        let taken = take_by_kind(&mut args, ArgKind::Name).and_then(CallArg::into_name);
        assert_eq!(taken.as_deref(), Some("first"));
        assert_eq!(args.len(), 4);
        assert!(take_by_kind(&mut args, ArgKind::Callback)
            .and_then(CallArg::into_callback)
            .is_some());
        assert!(take_by_kind(&mut args, ArgKind::Callback).is_none());
    }
}
