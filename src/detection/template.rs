//! Named icon templates and their key bindings
//!
//! Each record keeps the image and the binding together so the two can
//! never drift apart: every mutation adds, moves or drops both at once.
//! Iteration follows insertion order, which is also the tie-break order
//! used by the match engine.

use super::error::{TemplateStoreError, TemplateStoreResult};
use image::DynamicImage;

#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub name: String,
    pub image: DynamicImage,
    /// Key or `+`-joined chord; `None` while unbound
    pub key: Option<String>,
}

impl Template {
    pub fn new(name: impl Into<String>, image: DynamicImage, key: Option<String>) -> Self {
        Self {
            name: name.into(),
            image,
            key,
        }
    }

    pub fn is_bound(&self) -> bool {
        self.key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateStore {
    templates: Vec<Template>,
}

impl TemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.templates.iter().position(|t| t.name == name)
    }

    /// Snapshot of every record, in insertion order
    pub fn get_all(&self) -> &[Template] {
        &self.templates
    }

    pub fn get(&self, name: &str) -> Option<&Template> {
        self.templates.iter().find(|t| t.name == name)
    }

    /// Bound key for `name`, if the template exists and has one
    pub fn key_for(&self, name: &str) -> Option<&str> {
        self.get(name)
            .filter(|t| t.is_bound())
            .and_then(|t| t.key.as_deref())
    }

    pub fn names(&self) -> Vec<&str> {
        self.templates.iter().map(|t| t.name.as_str()).collect()
    }

    /// `(name, image)` pairs in the order the match engine should try them
    pub fn entries(&self) -> impl Iterator<Item = (&str, &DynamicImage)> {
        self.templates.iter().map(|t| (t.name.as_str(), &t.image))
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn bound_count(&self) -> usize {
        self.templates.iter().filter(|t| t.is_bound()).count()
    }

    /// Insert, or overwrite image and key in place when the name exists
    pub fn put(&mut self, name: &str, image: DynamicImage, key: Option<String>) {
        match self.position(name) {
            Some(idx) => {
                let existing = &mut self.templates[idx];
                existing.image = image;
                existing.key = key;
            }
            None => self.templates.push(Template::new(name, image, key)),
        }
    }

    /// Create-only variant of [`put`](Self::put)
    pub fn insert(
        &mut self,
        name: &str,
        image: DynamicImage,
        key: Option<String>,
    ) -> TemplateStoreResult<()> {
        if self.position(name).is_some() {
            return Err(TemplateStoreError::DuplicateName(name.to_string()));
        }
        self.templates.push(Template::new(name, image, key));
        Ok(())
    }

    /// Move image and key from `old_name` to `new_name` in one step
    pub fn rename(&mut self, old_name: &str, new_name: &str) -> TemplateStoreResult<()> {
        let idx = self
            .position(old_name)
            .ok_or_else(|| TemplateStoreError::NotFound(old_name.to_string()))?;
        if old_name == new_name {
            return Ok(());
        }
        if self.position(new_name).is_some() {
            return Err(TemplateStoreError::NameExists(new_name.to_string()));
        }
        self.templates[idx].name = new_name.to_string();
        Ok(())
    }

    /// Drop image and key together; absent names are ignored
    pub fn remove(&mut self, name: &str) -> Option<Template> {
        self.position(name).map(|idx| self.templates.remove(idx))
    }

    pub fn bind_key(&mut self, name: &str, key: Option<String>) -> TemplateStoreResult<()> {
        let idx = self
            .position(name)
            .ok_or_else(|| TemplateStoreError::NotFound(name.to_string()))?;
        self.templates[idx].key = key;
        Ok(())
    }
}
