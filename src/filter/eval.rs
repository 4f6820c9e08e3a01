//! Type-checking and evaluation of a parsed filter expression, compiling
//! it into the two artifacts described in spec.md §4.3: a candidate-key
//! pruning pass over an index's doc-values, and a residual predicate
//! (`matches_key`) usable for facets and for post-filtering vector hits.
//! Both read the doc-values projection, never the retrievable/stored one,
//! so a filterable-but-not-retrievable field still participates.

use super::ast::{CompareOp, Expr, Literal};
use super::parser::parse_filter;
use crate::catalog::{Field, FieldType, IndexDefinition, PrimitiveType};
use crate::error::{ApiError, FieldError};
use crate::lexical::{resolve_filter_field, LexicalIndex};
use crate::value::Value;
use chrono::DateTime;
use std::collections::{HashMap, HashSet};

pub struct CompiledFilter {
    expr: Expr,
    /// Filtered field name -> the doc-values field it is actually stored
    /// under (the `{name}__kw` sidecar when the field is also searchable).
    dv_names: HashMap<String, String>,
}

impl CompiledFilter {
    /// Parses and type-checks `text` against `definition`, enforcing that
    /// referenced fields exist, are filterable, and are compared against a
    /// compatible literal type.
    pub fn compile(text: &str, definition: &IndexDefinition) -> Result<Self, ApiError> {
        let expr = parse_filter(text)?;
        type_check(&expr, definition, None)?;
        let dv_names = definition
            .fields
            .iter()
            .filter_map(|f| resolve_filter_field(definition, &f.name))
            .map(|(field, dv_name)| (field.name.clone(), dv_name))
            .collect();
        Ok(Self { expr, dv_names })
    }

    fn dv_name(&self, field: &str) -> &str {
        self.dv_names.get(field).map(String::as_str).unwrap_or(field)
    }

    /// Evaluates the filter against one document's doc-values in `index` —
    /// the filterable projection, not the retrievable/stored one, so a
    /// field that is `filterable` but neither `retrievable` nor `stored`
    /// still matches (spec.md §4.3, invariant 9).
    pub fn matches_key(&self, index: &LexicalIndex, key: &str) -> bool {
        let resolve = |field: &str| index.doc_value(self.dv_name(field), key).cloned();
        eval_expr(&self.expr, &resolve, None).unwrap_or(false)
    }

    /// Prunes an index's full key set down to those whose doc-values
    /// satisfy the filter — the "lexical-index filter" half of the
    /// compiled artifact pair. Also usable as the residual predicate for
    /// post-filtering vector search hits.
    pub fn candidate_keys(&self, index: &LexicalIndex) -> HashSet<String> {
        index
            .keys()
            .filter(|key| self.matches_key(index, key))
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TypeClass {
    String,
    Number,
    Boolean,
    Date,
    Geo,
}

fn primitive_class(p: PrimitiveType) -> TypeClass {
    match p {
        PrimitiveType::String => TypeClass::String,
        PrimitiveType::Int32 | PrimitiveType::Int64 | PrimitiveType::Double | PrimitiveType::Single => {
            TypeClass::Number
        }
        PrimitiveType::Boolean => TypeClass::Boolean,
        PrimitiveType::DateTimeOffset => TypeClass::Date,
        PrimitiveType::GeographyPoint => TypeClass::Geo,
    }
}

fn literal_class(lit: &Literal) -> Option<TypeClass> {
    match lit {
        Literal::Str(_) => Some(TypeClass::String),
        Literal::Num(_) => Some(TypeClass::Number),
        Literal::Bool(_) => Some(TypeClass::Boolean),
        Literal::Null => None,
    }
}

fn type_check(expr: &Expr, definition: &IndexDefinition, loop_var: Option<&str>) -> Result<(), ApiError> {
    match expr {
        Expr::Compare { field, op, value } => {
            if Some(field.as_str()) == loop_var {
                return Ok(());
            }
            let f = resolve_filterable(definition, field)?;
            if let Some(lit_class) = literal_class(value) {
                let field_class = match &f.field_type {
                    FieldType::Primitive(p) | FieldType::Collection(p) => primitive_class(*p),
                    FieldType::Complex(_) => {
                        return Err(typed_error(field, "complex fields cannot be compared directly"))
                    }
                };
                if field_class != lit_class {
                    return Err(typed_error(
                        field,
                        format!(
                            "cannot compare {:?}-typed field to a {:?} literal",
                            field_class, lit_class
                        ),
                    ));
                }
                if field_class == TypeClass::Date {
                    if let Literal::Str(s) = value {
                        if DateTime::parse_from_rfc3339(s).is_err() {
                            return Err(typed_error(field, format!("'{s}' is not a valid RFC3339 date")));
                        }
                    }
                }
            }
            if matches!(op, CompareOp::Gt | CompareOp::Ge | CompareOp::Lt | CompareOp::Le)
                && matches!(f.field_type, FieldType::Primitive(PrimitiveType::Boolean))
            {
                return Err(typed_error(field, "boolean fields only support eq/ne"));
            }
            Ok(())
        }
        Expr::And(a, b) | Expr::Or(a, b) => {
            type_check(a, definition, loop_var)?;
            type_check(b, definition, loop_var)
        }
        Expr::Not(inner) => type_check(inner, definition, loop_var),
        Expr::SearchIn { field, .. } => {
            let f = resolve_filterable(definition, field)?;
            if !f.field_type.is_string_like() {
                return Err(typed_error(field, "search.in requires a string-typed field"));
            }
            Ok(())
        }
        Expr::GeoDistance { field, .. } => {
            let f = resolve_filterable(definition, field)?;
            if !matches!(f.field_type, FieldType::Primitive(PrimitiveType::GeographyPoint)) {
                return Err(typed_error(field, "geo.distance requires a GeographyPoint field"));
            }
            Ok(())
        }
        Expr::CollectionAny { field, var, predicate } | Expr::CollectionAll { field, var, predicate } => {
            let f = resolve_filterable(definition, field)?;
            if !f.field_type.is_collection() {
                return Err(typed_error(field, "any()/all() require a collection field"));
            }
            type_check(predicate, definition, Some(var.as_str()))
        }
        Expr::CollectionNonEmpty { field } => {
            let f = resolve_filterable(definition, field)?;
            if !f.field_type.is_collection() {
                return Err(typed_error(field, "any() requires a collection field"));
            }
            Ok(())
        }
    }
}

fn resolve_filterable<'a>(definition: &'a IndexDefinition, name: &str) -> Result<&'a Field, ApiError> {
    let field = definition
        .field(name)
        .ok_or_else(|| typed_error(name, "references an unknown field"))?;
    if !field.flags.filterable {
        return Err(typed_error(name, "is not filterable"));
    }
    Ok(field)
}

fn typed_error(field: &str, message: impl Into<String>) -> ApiError {
    ApiError::validation(vec![FieldError::new(field, message)])
}

fn eval_expr(expr: &Expr, resolve: &dyn Fn(&str) -> Option<Value>, ctx: Option<(&str, &Value)>) -> Result<bool, ApiError> {
    match expr {
        Expr::Compare { field, op, value } => {
            let resolved = resolve_value(field, resolve, ctx);
            Ok(compare(resolved.as_ref(), *op, value))
        }
        Expr::And(a, b) => Ok(eval_expr(a, resolve, ctx)? && eval_expr(b, resolve, ctx)?),
        Expr::Or(a, b) => Ok(eval_expr(a, resolve, ctx)? || eval_expr(b, resolve, ctx)?),
        Expr::Not(inner) => Ok(!eval_expr(inner, resolve, ctx)?),
        Expr::SearchIn { field, values } => {
            let resolved = resolve_value(field, resolve, ctx);
            Ok(resolved
                .and_then(|v| v.as_str().map(|s| s.to_string()))
                .map(|s| values.iter().any(|v| v == &s))
                .unwrap_or(false))
        }
        Expr::GeoDistance { field, op, lon, lat, km } => {
            let resolved = resolve_value(field, resolve, ctx);
            let dist = resolved.and_then(|v| match v {
                Value::Geo(g) => Some(g.distance_km(&crate::value::GeoPoint::new(*lon, *lat))),
                _ => None,
            });
            match dist {
                Some(d) => Ok(compare_numbers(d, *op, *km)),
                None => Ok(false),
            }
        }
        Expr::CollectionAny { field, var, predicate } => {
            let items = resolve(field).and_then(|v| v.as_list().map(|l| l.to_vec())).unwrap_or_default();
            for item in &items {
                if eval_expr(predicate, resolve, Some((var.as_str(), item)))? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Expr::CollectionAll { field, var, predicate } => {
            let items = resolve(field).and_then(|v| v.as_list().map(|l| l.to_vec())).unwrap_or_default();
            if items.is_empty() {
                return Ok(true);
            }
            for item in &items {
                if !eval_expr(predicate, resolve, Some((var.as_str(), item)))? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Expr::CollectionNonEmpty { field } => {
            Ok(resolve(field).and_then(|v| v.as_list().map(|l| !l.is_empty())).unwrap_or(false))
        }
    }
}

fn resolve_value(field: &str, resolve: &dyn Fn(&str) -> Option<Value>, ctx: Option<(&str, &Value)>) -> Option<Value> {
    if let Some((var, elem)) = ctx {
        if field == var {
            return Some(elem.clone());
        }
    }
    resolve(field)
}

fn compare(value: Option<&Value>, op: CompareOp, literal: &Literal) -> bool {
    match (value, literal) {
        (None, Literal::Null) => true,
        (Some(Value::Null), Literal::Null) => true,
        (Some(_), Literal::Null) => false,
        (None, _) => false,
        (Some(Value::Str(s)), Literal::Str(l)) => compare_ord(s.as_str(), op, l.as_str()),
        (Some(Value::Bool(b)), Literal::Bool(l)) => compare_eq_only(*b, op, *l),
        (Some(v), Literal::Num(l)) => v.as_f64().map(|n| compare_numbers(n, op, *l)).unwrap_or(false),
        (Some(Value::Date(d)), Literal::Str(s)) => DateTime::parse_from_rfc3339(s)
            .map(|parsed| compare_ord(*d, op, parsed.with_timezone(&chrono::Utc)))
            .unwrap_or(false),
        _ => false,
    }
}

fn compare_ord<T: PartialOrd>(a: T, op: CompareOp, b: T) -> bool {
    match op {
        CompareOp::Eq => a == b,
        CompareOp::Ne => a != b,
        CompareOp::Gt => a > b,
        CompareOp::Ge => a >= b,
        CompareOp::Lt => a < b,
        CompareOp::Le => a <= b,
    }
}

fn compare_eq_only(a: bool, op: CompareOp, b: bool) -> bool {
    match op {
        CompareOp::Eq => a == b,
        CompareOp::Ne => a != b,
        _ => false,
    }
}

fn compare_numbers(a: f64, op: CompareOp, b: f64) -> bool {
    match op {
        CompareOp::Eq => (a - b).abs() < f64::EPSILON,
        CompareOp::Ne => (a - b).abs() >= f64::EPSILON,
        CompareOp::Gt => a > b,
        CompareOp::Ge => a >= b,
        CompareOp::Lt => a < b,
        CompareOp::Le => a <= b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::AnalyzerRegistry;
    use crate::catalog::FieldFlags;
    use crate::value::{Document, Value};

    fn index_def() -> IndexDefinition {
        IndexDefinition::new(
            "products",
            vec![
                Field::new("id", FieldType::Primitive(PrimitiveType::String), FieldFlags { key: true, ..Default::default() }),
                Field::new("price", FieldType::Primitive(PrimitiveType::Double), FieldFlags { filterable: true, ..Default::default() }),
                Field::new("category", FieldType::Primitive(PrimitiveType::String), FieldFlags { filterable: true, ..Default::default() }),
                Field::new("tags", FieldType::Collection(PrimitiveType::String), FieldFlags { filterable: true, ..Default::default() }),
            ],
        )
    }

    fn doc(id: &str, price: f64, category: &str, tags: Vec<&str>) -> Document {
        let mut d = Document::new();
        d.insert("id".into(), Value::Str(id.to_string()));
        d.insert("price".into(), Value::F64(price));
        d.insert("category".into(), Value::Str(category.to_string()));
        d.insert("tags".into(), Value::List(tags.into_iter().map(|t| Value::Str(t.to_string())).collect()));
        d
    }

    /// Builds a lexical index over `docs` so tests exercise the same
    /// doc-values path `candidate_keys`/`matches_key` read in production.
    fn indexed(def: &IndexDefinition, docs: Vec<Document>) -> LexicalIndex {
        let mut index = LexicalIndex::new(def.clone(), AnalyzerRegistry::new());
        for d in docs {
            index.upsert(d).unwrap();
        }
        index.commit();
        index
    }

    #[test]
    fn eq_on_filterable_field_matches_only_equal_docs() {
        let def = index_def();
        let index = indexed(&def, vec![doc("1", 5.0, "a", vec![]), doc("2", 5.0, "b", vec![])]);
        let filter = CompiledFilter::compile("category eq 'a'", &def).unwrap();
        let keys = filter.candidate_keys(&index);
        assert!(keys.contains("1"));
        assert!(!keys.contains("2"));
    }

    #[test]
    fn rejects_date_compared_to_string_typed_field() {
        let def = index_def();
        let err = CompiledFilter::compile("category eq 5", &def);
        assert!(err.is_err());
    }

    #[test]
    fn rejects_unfilterable_field() {
        let def = index_def();
        let err = CompiledFilter::compile("id eq 'x'", &def);
        assert!(err.is_err());
    }

    #[test]
    fn collection_any_matches_when_one_tag_satisfies_predicate() {
        let def = index_def();
        let index = indexed(
            &def,
            vec![doc("1", 5.0, "a", vec!["sale", "new"]), doc("2", 5.0, "a", vec!["new"])],
        );
        let filter = CompiledFilter::compile("tags/any(t: t eq 'sale')", &def).unwrap();
        let keys = filter.candidate_keys(&index);
        assert!(keys.contains("1"));
        assert!(!keys.contains("2"));
    }

    #[test]
    fn and_or_combine_correctly() {
        let def = index_def();
        let index = indexed(&def, vec![doc("1", 20.0, "a", vec![]), doc("2", 5.0, "a", vec![])]);
        let filter = CompiledFilter::compile("price gt 10 and category eq 'a'", &def).unwrap();
        let keys = filter.candidate_keys(&index);
        assert!(keys.contains("1"));
        assert!(!keys.contains("2"));
    }

    #[test]
    fn matches_filterable_field_that_is_not_retrievable_or_stored() {
        // category is filterable only (no stored/retrievable flag), so the
        // retrievable projection (`LexicalIndex::get`) would not carry it —
        // the filter must still match via doc-values.
        let def = index_def();
        let index = indexed(&def, vec![doc("1", 5.0, "a", vec![])]);
        assert!(index.get("1").map(|d| !d.contains_key("category")).unwrap_or(false));
        let filter = CompiledFilter::compile("category eq 'a'", &def).unwrap();
        assert!(filter.matches_key(&index, "1"));
    }
}
