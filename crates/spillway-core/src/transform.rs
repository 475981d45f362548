//! Per-tuple transforms applied on the read side.
//!
//! Collections hand tuples back exactly as they were appended. Anything
//! that reshapes a record (projection, computed columns, an expression
//! engine) plugs in here as a [`TupleTransform`] and is applied lazily with
//! [`TransformExt::transformed`].
//!
//! ```
//! use spillway_common::{SpillConfig, Tuple, Value};
//! use spillway_core::collect::SpillableTupleList;
//! use spillway_core::transform::{ProjectExpr, ProjectTransform, TransformExt};
//!
//! let mut list = SpillableTupleList::new(&SpillConfig::default().with_list_threshold(2))?;
//! list.append(Tuple::from(vec![Value::from(1i64), Value::from("a")]))?;
//! list.append(Tuple::from(vec![Value::from(2i64), Value::from("b")]))?;
//!
//! let swap = ProjectTransform::select_columns([1, 0]);
//! let out: Vec<Tuple> = list.iter()?.transformed(&swap).collect::<Result<_, _>>()?;
//! assert_eq!(out[0], Tuple::from(vec![Value::from("a"), Value::from(1i64)]));
//! # Ok::<(), spillway_common::Error>(())
//! ```

use spillway_common::types::{Tuple, Value};
use spillway_common::utils::error::{Error, Result};

/// Turns one tuple into another.
pub trait TupleTransform {
    /// Evaluates the transform against `tuple`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transform`] if the tuple does not fit the transform.
    fn evaluate(&self, tuple: &Tuple) -> Result<Tuple>;
}

impl<F> TupleTransform for F
where
    F: Fn(&Tuple) -> Result<Tuple>,
{
    fn evaluate(&self, tuple: &Tuple) -> Result<Tuple> {
        self(tuple)
    }
}

/// A projection expression.
#[derive(Debug, Clone, PartialEq)]
pub enum ProjectExpr {
    /// Reference to an input column.
    Column(usize),
    /// A constant value.
    Constant(Value),
}

/// Builds each output tuple from input columns and constants.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectTransform {
    projections: Vec<ProjectExpr>,
}

impl ProjectTransform {
    /// Creates a projection from expressions, one per output column.
    #[must_use]
    pub fn new(projections: Vec<ProjectExpr>) -> Self {
        Self { projections }
    }

    /// Creates a projection that selects (and possibly reorders) columns.
    #[must_use]
    pub fn select_columns(columns: impl IntoIterator<Item = usize>) -> Self {
        Self::new(columns.into_iter().map(ProjectExpr::Column).collect())
    }

    /// Output arity.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.projections.len()
    }
}

impl TupleTransform for ProjectTransform {
    fn evaluate(&self, tuple: &Tuple) -> Result<Tuple> {
        let mut output = Tuple::with_capacity(self.projections.len());
        for proj in &self.projections {
            match proj {
                ProjectExpr::Column(col) => {
                    let value = tuple.get(*col).ok_or_else(|| {
                        Error::Transform(format!("column {col} out of range for arity {}", tuple.len()))
                    })?;
                    output.push(value.clone());
                }
                ProjectExpr::Constant(value) => output.push(value.clone()),
            }
        }
        Ok(output)
    }
}

/// Iterator adapter produced by [`TransformExt::transformed`].
pub struct Transformed<'t, I, T: ?Sized> {
    inner: I,
    transform: &'t T,
}

impl<I, T> Iterator for Transformed<'_, I, T>
where
    I: Iterator<Item = Result<Tuple>>,
    T: TupleTransform + ?Sized,
{
    type Item = Result<Tuple>;

    fn next(&mut self) -> Option<Self::Item> {
        let tuple = self.inner.next()?;
        Some(tuple.and_then(|t| self.transform.evaluate(&t)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// Applies a [`TupleTransform`] to every tuple of a fallible tuple stream.
pub trait TransformExt: Iterator<Item = Result<Tuple>> + Sized {
    /// Lazily maps each `Ok` tuple through `transform`; errors pass through.
    fn transformed<T>(self, transform: &T) -> Transformed<'_, Self, T>
    where
        T: TupleTransform + ?Sized,
    {
        Transformed {
            inner: self,
            transform,
        }
    }
}

impl<I> TransformExt for I where I: Iterator<Item = Result<Tuple>> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(a: i64, b: &str, c: i64) -> Tuple {
        Tuple::from(vec![Value::from(a), Value::from(b), Value::from(c)])
    }

    #[test]
    fn test_project_select_columns() {
        let project = ProjectTransform::select_columns([2, 0]);
        assert_eq!(project.arity(), 2);

        let out = project.evaluate(&row(1, "hello", 100)).unwrap();
        assert_eq!(out, Tuple::from(vec![Value::from(100i64), Value::from(1i64)]));
    }

    #[test]
    fn test_project_constant() {
        let project = ProjectTransform::new(vec![
            ProjectExpr::Column(0),
            ProjectExpr::Constant(Value::from("constant")),
        ]);
        let out = project.evaluate(&row(7, "x", 0)).unwrap();
        assert_eq!(out.get(0), Some(&Value::from(7i64)));
        assert_eq!(out.get(1).and_then(Value::as_str), Some("constant"));
    }

    #[test]
    fn test_project_missing_column() {
        let project = ProjectTransform::select_columns([5]);
        let err = project.evaluate(&row(1, "a", 2)).unwrap_err();
        assert!(matches!(err, Error::Transform(_)));
    }

    #[test]
    fn test_closure_transform() {
        let double = |t: &Tuple| -> Result<Tuple> {
            t.iter()
                .map(|v| {
                    v.as_int64()
                        .map(|n| Value::from(n * 2))
                        .ok_or_else(|| Error::Transform(format!("not an integer: {v}")))
                })
                .collect()
        };

        assert_eq!(double.evaluate(&Tuple::single(21i64)).unwrap(), Tuple::single(42i64));
        assert!(double.evaluate(&Tuple::single("x")).is_err());
    }

    #[test]
    fn test_transformed_passes_errors_through() {
        let input = vec![
            Ok(row(1, "a", 2)),
            Err(Error::Corruption("bad".to_string())),
            Ok(row(3, "b", 4)),
        ];
        let project = ProjectTransform::select_columns([1]);
        let out: Vec<Result<Tuple>> = input.into_iter().transformed(&project).collect();

        assert_eq!(out.len(), 3);
        assert_eq!(out[0].as_ref().unwrap(), &Tuple::single("a"));
        assert!(matches!(out[1], Err(Error::Corruption(_))));
        assert_eq!(out[2].as_ref().unwrap(), &Tuple::single("b"));
    }

    #[test]
    fn test_transformed_dyn() {
        let project: Box<dyn TupleTransform> = Box::new(ProjectTransform::select_columns([0]));
        let out: Vec<Tuple> = vec![Ok(row(9, "z", 0))]
            .into_iter()
            .transformed(project.as_ref())
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(out, vec![Tuple::single(9i64)]);
    }
}
