//! Typed eager-load paths.
//!
//! An include path is built from the `Reference`/`Collection` descriptors that
//! `#[derive(Record)]` generates, so a path that does not start at `T` or
//! chains through the wrong type does not compile:
//!
//! ```ignore
//! let by_team: Include<Hero> = Hero::TEAM.into();
//! let deep: Include<Team> = Team::HEROES.then(Hero::POWERS).into();
//! ```

use std::fmt;
use std::marker::PhantomData;

use repokit_core::{Collection, NavigationKind, Record, Reference, Result};

use crate::select::{IncludePlan, IncludeStep};

/// One hop of an include path, from `Owner` to `Self::Target`.
pub trait NavigationStep<Owner>: Copy {
    /// Record type at the far end of the hop.
    type Target;

    /// Navigation name on `Owner`.
    fn name(&self) -> &'static str;

    /// Shape of the navigation.
    fn kind(&self) -> NavigationKind;

    /// Continue the path with a navigation on `Self::Target`.
    fn then<N>(self, next: N) -> IncludePath<Owner, N::Target>
    where
        N: NavigationStep<Self::Target>,
    {
        IncludePath::start(self).then(next)
    }
}

impl<T, R> NavigationStep<T> for Reference<T, R> {
    type Target = R;

    fn name(&self) -> &'static str {
        self.name
    }

    fn kind(&self) -> NavigationKind {
        NavigationKind::Reference
    }
}

impl<T, R> NavigationStep<T> for Collection<T, R> {
    type Target = R;

    fn name(&self) -> &'static str {
        self.name
    }

    fn kind(&self) -> NavigationKind {
        NavigationKind::Collection
    }
}

/// A multi-hop include path rooted at `T` and currently ending at `L`.
pub struct IncludePath<T, L> {
    steps: Vec<(&'static str, NavigationKind)>,
    _marker: PhantomData<fn() -> (T, L)>,
}

impl<T, L> IncludePath<T, L> {
    /// Start a path with its first hop.
    pub fn start<N: NavigationStep<T, Target = L>>(first: N) -> Self {
        Self {
            steps: vec![(first.name(), first.kind())],
            _marker: PhantomData,
        }
    }

    /// Append a hop on the current end type.
    pub fn then<N: NavigationStep<L>>(mut self, next: N) -> IncludePath<T, N::Target> {
        self.steps.push((next.name(), next.kind()));
        IncludePath {
            steps: self.steps,
            _marker: PhantomData,
        }
    }
}

/// An eager-load path rooted at record type `T`.
pub struct Include<T> {
    steps: Vec<(&'static str, NavigationKind)>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Include<T> {
    /// Navigation names along the path, root first.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.steps.iter().map(|(name, _)| *name)
    }

    /// Number of hops.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.steps.len()
    }
}

impl<T: Record> Include<T> {
    /// Resolve each hop against the navigation metadata of its owner.
    ///
    /// Step filters are left empty; the caller decides visibility.
    pub fn plan(&self) -> Result<IncludePlan> {
        let mut owner = T::entity_type();
        let mut steps = Vec::with_capacity(self.steps.len());
        for (name, kind) in &self.steps {
            let navigation = owner.navigation(name, *kind)?;
            owner = navigation.target_entity();
            steps.push(IncludeStep {
                navigation,
                filter: None,
            });
        }
        Ok(IncludePlan { steps })
    }
}

impl<T> Clone for Include<T> {
    fn clone(&self) -> Self {
        Self {
            steps: self.steps.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Include<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Include(")?;
        for (i, name) in self.names().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            f.write_str(name)?;
        }
        f.write_str(")")
    }
}

impl<T, R> From<Reference<T, R>> for Include<T> {
    fn from(reference: Reference<T, R>) -> Self {
        IncludePath::start(reference).into()
    }
}

impl<T, R> From<Collection<T, R>> for Include<T> {
    fn from(collection: Collection<T, R>) -> Self {
        IncludePath::start(collection).into()
    }
}

impl<T, L> From<IncludePath<T, L>> for Include<T> {
    fn from(path: IncludePath<T, L>) -> Self {
        Self {
            steps: path.steps,
            _marker: PhantomData,
        }
    }
}
