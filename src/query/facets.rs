//! Facet computation over a filter's candidate key set (spec.md §4.6
//! step 10).

use crate::catalog::IndexDefinition;
use crate::lexical::LexicalIndex;
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Debug, Clone)]
pub struct FacetValue {
    pub value: String,
    pub count: usize,
}

/// Counts values of each requested facetable field across `candidate_keys`.
/// Collection fields contribute one count per distinct element.
pub fn compute_facets(
    index: &LexicalIndex,
    definition: &IndexDefinition,
    candidate_keys: &HashSet<String>,
    facet_fields: &[String],
) -> BTreeMap<String, Vec<FacetValue>> {
    let mut out = BTreeMap::new();
    for field_name in facet_fields {
        let Some(field) = definition.field(field_name) else {
            continue;
        };
        if !field.flags.facetable {
            continue;
        }
        let dv_name = crate::lexical::doc_value_field_name(field);
        let mut counts: HashMap<String, usize> = HashMap::new();
        if let Some(values) = index.all_doc_values(&dv_name) {
            for key in candidate_keys {
                if let Some(value) = values.get(key) {
                    match value.as_list() {
                        Some(items) => {
                            for item in items {
                                *counts.entry(item.to_display_string()).or_insert(0) += 1;
                            }
                        }
                        None => {
                            *counts.entry(value.to_display_string()).or_insert(0) += 1;
                        }
                    }
                }
            }
        }
        let mut values: Vec<FacetValue> = counts.into_iter().map(|(value, count)| FacetValue { value, count }).collect();
        values.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
        out.insert(field_name.clone(), values);
    }
    out
}
