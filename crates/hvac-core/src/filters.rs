//! Element classification predicates.
//!
//! Three filters decide which host elements the engine cares about: spaces,
//! air terminals, and annotations of one specific family and type. They are
//! built once per session and shared by the link store, the change processor
//! and trigger registration.

use std::fmt;

use crate::host::{AnnotationSymbol, ElementHeader, HostCategory, HostDocument};
use crate::ids::ElementId;

pub const DEFAULT_ANNOTATION_FAMILY: &str = "Ventilation Space Tag";
pub const DEFAULT_ANNOTATION_TYPE: &str = "Standard";

/// The engine's own element kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ElementKind {
    Space,
    Terminal,
    Annotation,
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElementKind::Space => "space",
            ElementKind::Terminal => "terminal",
            ElementKind::Annotation => "annotation",
        };
        f.write_str(name)
    }
}

/// Category predicate, optionally narrowed to a family and type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ElementFilter {
    pub kind: ElementKind,
    pub category: HostCategory,
    pub family: Option<String>,
    pub type_name: Option<String>,
}

impl ElementFilter {
    pub fn category(kind: ElementKind, category: HostCategory) -> Self {
        Self {
            kind,
            category,
            family: None,
            type_name: None,
        }
    }

    pub fn matches(&self, header: &ElementHeader) -> bool {
        if header.category != self.category {
            return false;
        }
        if let Some(family) = &self.family
            && header.family.as_deref() != Some(family.as_str())
        {
            return false;
        }
        if let Some(type_name) = &self.type_name
            && header.type_name.as_deref() != Some(type_name.as_str())
        {
            return false;
        }
        true
    }
}

#[derive(Clone, Debug)]
pub struct FilterRegistry {
    pub space: ElementFilter,
    pub terminal: ElementFilter,
    pub annotation: ElementFilter,
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_ANNOTATION_FAMILY, DEFAULT_ANNOTATION_TYPE)
    }
}

impl FilterRegistry {
    pub fn new(annotation_family: &str, annotation_type: &str) -> Self {
        Self {
            space: ElementFilter::category(ElementKind::Space, HostCategory::Space),
            terminal: ElementFilter::category(ElementKind::Terminal, HostCategory::AirTerminal),
            annotation: ElementFilter {
                kind: ElementKind::Annotation,
                category: HostCategory::GenericAnnotation,
                family: Some(annotation_family.to_string()),
                type_name: Some(annotation_type.to_string()),
            },
        }
    }

    pub fn filter(&self, kind: ElementKind) -> &ElementFilter {
        match kind {
            ElementKind::Space => &self.space,
            ElementKind::Terminal => &self.terminal,
            ElementKind::Annotation => &self.annotation,
        }
    }

    pub fn classify(&self, header: &ElementHeader) -> Option<ElementKind> {
        [&self.space, &self.terminal, &self.annotation]
            .into_iter()
            .find(|f| f.matches(header))
            .map(|f| f.kind)
    }

    /// Classify a live element; `None` for deleted or untracked elements.
    pub fn kind_of<D: HostDocument + ?Sized>(&self, doc: &D, id: ElementId) -> Option<ElementKind> {
        doc.header(id).and_then(|h| self.classify(&h))
    }

    /// All live elements passing the filter for `kind`, in host order.
    pub fn collect<D: HostDocument + ?Sized>(&self, doc: &D, kind: ElementKind) -> Vec<ElementId> {
        let filter = self.filter(kind);
        doc.elements_in(filter.category)
            .into_iter()
            .filter(|&id| doc.header(id).is_some_and(|h| filter.matches(&h)))
            .collect()
    }

    pub fn annotation_symbol(&self) -> AnnotationSymbol {
        AnnotationSymbol {
            family: self.annotation.family.clone().unwrap_or_default(),
            type_name: self.annotation.type_name.clone().unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(category: HostCategory, family: Option<&str>, type_name: Option<&str>) -> ElementHeader {
        ElementHeader {
            category,
            family: family.map(String::from),
            type_name: type_name.map(String::from),
            level: None,
        }
    }

    #[test]
    fn test_classify_categories() {
        let filters = FilterRegistry::default();
        assert_eq!(
            filters.classify(&header(HostCategory::Space, None, None)),
            Some(ElementKind::Space)
        );
        assert_eq!(
            filters.classify(&header(HostCategory::AirTerminal, Some("Diffuser"), None)),
            Some(ElementKind::Terminal)
        );
        assert_eq!(filters.classify(&header(HostCategory::Other, None, None)), None);
    }

    #[test]
    fn test_annotation_needs_family_and_type() {
        let filters = FilterRegistry::new("Tag", "A");
        let tag = header(HostCategory::GenericAnnotation, Some("Tag"), Some("A"));
        let other_type = header(HostCategory::GenericAnnotation, Some("Tag"), Some("B"));
        let other_family = header(HostCategory::GenericAnnotation, Some("Note"), Some("A"));

        assert_eq!(filters.classify(&tag), Some(ElementKind::Annotation));
        assert_eq!(filters.classify(&other_type), None);
        assert_eq!(filters.classify(&other_family), None);
    }

    #[test]
    fn test_symbol_from_annotation_filter() {
        let filters = FilterRegistry::new("Tag", "A");
        let symbol = filters.annotation_symbol();
        assert_eq!(symbol.family, "Tag");
        assert_eq!(symbol.type_name, "A");
    }
}
