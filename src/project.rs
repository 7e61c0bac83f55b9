//! Project object collection
//!
//! A [`Project`] owns every open document under a unique name. Names can be
//! reserved ahead of time with [`Project::promise`] while a document is still
//! being built, typically on a worker thread; [`Project::new_object`] resolves
//! the promise, and any failure while initialising retracts it.
//!
//! Lifecycle changes are published on the event bus as [`ObjectEvent`]s.

use std::collections::HashSet;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use pcbcam_camlib::{
    CamResult, CncJob, CncJobOptions, Document, Excellon, ExcellonOptions, Geometry, GeometryOptions, Gerber,
    GerberOptions, ObjectOptions, Zeros,
};
use pcbcam_core::{event_bus, AppEvent, EventBus, ObjectEvent, ProjectError, TaskContext, Units, WorkerStack};
use pcbcam_settings::Config;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};

/// Document kinds held by a project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Gerber,
    Excellon,
    Geometry,
    CncJob,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Gerber => "gerber",
            ObjectKind::Excellon => "excellon",
            ObjectKind::Geometry => "geometry",
            ObjectKind::CncJob => "cncjob",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A document together with its options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CamObject {
    Gerber {
        document: Gerber,
        options: GerberOptions,
    },
    Excellon {
        document: Excellon,
        options: ExcellonOptions,
    },
    Geometry {
        document: Geometry,
        options: GeometryOptions,
    },
    CncJob {
        document: CncJob,
        options: CncJobOptions,
    },
}

/// Convert one settings section into the matching options struct. Both use
/// the same key names.
fn section_options<S: Serialize, O: DeserializeOwned>(section: &S) -> AppResult<O> {
    Ok(serde_json::from_value(serde_json::to_value(section)?)?)
}

impl CamObject {
    /// Empty document of `kind`, configured from the application defaults.
    pub fn from_defaults(kind: ObjectKind, defaults: &Config) -> AppResult<Self> {
        let general = &defaults.general;
        Ok(match kind {
            ObjectKind::Gerber => {
                let mut document = Gerber::new();
                document.arc_tolerance.radius = general.arc_tolerance;
                CamObject::Gerber {
                    document,
                    options: section_options(&defaults.gerber)?,
                }
            }
            ObjectKind::Excellon => {
                let zeros: Zeros = serde_json::from_value(Value::String(defaults.excellon.zeros.clone()))?;
                CamObject::Excellon {
                    document: Excellon::with_zeros(zeros),
                    options: section_options(&defaults.excellon)?,
                }
            }
            ObjectKind::Geometry => CamObject::Geometry {
                document: Geometry::new(general.units),
                options: section_options(&defaults.geometry)?,
            },
            ObjectKind::CncJob => {
                let mut document = CncJob::new(general.units);
                document.coordinate_format = general.coordinate_format.clone();
                document.zdownrate = general.zdownrate;
                CamObject::CncJob {
                    document,
                    options: section_options(&defaults.cncjob)?,
                }
            }
        })
    }

    pub fn kind(&self) -> ObjectKind {
        match self {
            CamObject::Gerber { .. } => ObjectKind::Gerber,
            CamObject::Excellon { .. } => ObjectKind::Excellon,
            CamObject::Geometry { .. } => ObjectKind::Geometry,
            CamObject::CncJob { .. } => ObjectKind::CncJob,
        }
    }

    pub fn document(&self) -> &dyn Document {
        match self {
            CamObject::Gerber { document, .. } => document,
            CamObject::Excellon { document, .. } => document,
            CamObject::Geometry { document, .. } => document,
            CamObject::CncJob { document, .. } => document,
        }
    }

    pub fn document_mut(&mut self) -> &mut dyn Document {
        match self {
            CamObject::Gerber { document, .. } => document,
            CamObject::Excellon { document, .. } => document,
            CamObject::Geometry { document, .. } => document,
            CamObject::CncJob { document, .. } => document,
        }
    }

    /// The `plot` option of whichever kind this is.
    pub fn plot_enabled(&self) -> bool {
        match self {
            CamObject::Gerber { options, .. } => options.plot,
            CamObject::Excellon { options, .. } => options.plot,
            CamObject::Geometry { options, .. } => options.plot,
            CamObject::CncJob { options, .. } => options.plot,
        }
    }

    pub fn get_option(&self, key: &str) -> Option<Value> {
        match self {
            CamObject::Gerber { options, .. } => options.get_option(key),
            CamObject::Excellon { options, .. } => options.get_option(key),
            CamObject::Geometry { options, .. } => options.get_option(key),
            CamObject::CncJob { options, .. } => options.get_option(key),
        }
    }

    /// Set one option and publish the change under `name`.
    pub fn set_option(&mut self, name: &str, key: &str, value: Value, bus: &EventBus) -> CamResult<()> {
        match self {
            CamObject::Gerber { options, .. } => options.set_option(name, key, value, bus),
            CamObject::Excellon { options, .. } => options.set_option(name, key, value, bus),
            CamObject::Geometry { options, .. } => options.set_option(name, key, value, bus),
            CamObject::CncJob { options, .. } => options.set_option(name, key, value, bus),
        }
    }

    /// Switch document and length options to `units`. Returns the factor.
    pub fn convert_units(&mut self, units: Units) -> f64 {
        let factor = self.document_mut().convert_units(units);
        if factor != 1.0 {
            match self {
                CamObject::Gerber { options, .. } => options.scale_lengths(factor),
                CamObject::Excellon { options, .. } => options.scale_lengths(factor),
                CamObject::Geometry { options, .. } => options.scale_lengths(factor),
                CamObject::CncJob { options, .. } => options.scale_lengths(factor),
            }
        }
        factor
    }

    fn kind_mismatch(&self, name: &str, expected: ObjectKind) -> ProjectError {
        ProjectError::KindMismatch {
            name: name.to_string(),
            expected: expected.to_string(),
            actual: self.kind().to_string(),
        }
    }

    /// The Gerber document, or a kind mismatch naming `name`.
    pub fn gerber(&self, name: &str) -> Result<(&Gerber, &GerberOptions), ProjectError> {
        match self {
            CamObject::Gerber { document, options } => Ok((document, options)),
            other => Err(other.kind_mismatch(name, ObjectKind::Gerber)),
        }
    }

    pub fn excellon(&self, name: &str) -> Result<(&Excellon, &ExcellonOptions), ProjectError> {
        match self {
            CamObject::Excellon { document, options } => Ok((document, options)),
            other => Err(other.kind_mismatch(name, ObjectKind::Excellon)),
        }
    }

    pub fn geometry(&self, name: &str) -> Result<(&Geometry, &GeometryOptions), ProjectError> {
        match self {
            CamObject::Geometry { document, options } => Ok((document, options)),
            other => Err(other.kind_mismatch(name, ObjectKind::Geometry)),
        }
    }

    pub fn geometry_mut(&mut self, name: &str) -> Result<&mut Geometry, ProjectError> {
        match self {
            CamObject::Geometry { document, .. } => Ok(document),
            other => Err(other.kind_mismatch(name, ObjectKind::Geometry)),
        }
    }

    pub fn cncjob(&self, name: &str) -> Result<(&CncJob, &CncJobOptions), ProjectError> {
        match self {
            CamObject::CncJob { document, options } => Ok((document, options)),
            other => Err(other.kind_mismatch(name, ObjectKind::CncJob)),
        }
    }
}

/// Shared handle to a document in the project
pub type ObjectHandle = Arc<RwLock<CamObject>>;

struct Inner {
    objects: Vec<(String, ObjectHandle)>,
    promises: HashSet<String>,
    defaults: Config,
}

impl Inner {
    fn find(&self, name: &str) -> Option<&ObjectHandle> {
        self.objects.iter().find(|(n, _)| n == name).map(|(_, h)| h)
    }
}

#[derive(Serialize, Deserialize)]
struct SavedObject {
    name: String,
    object: CamObject,
}

#[derive(Serialize, Deserialize)]
struct ProjectFile {
    version: String,
    defaults: Config,
    objects: Vec<SavedObject>,
}

/// Named, ordered collection of documents
#[derive(Clone)]
pub struct Project {
    inner: Arc<RwLock<Inner>>,
    bus: &'static EventBus,
}

impl Project {
    /// Empty project publishing on the global event bus
    pub fn new(defaults: Config) -> Self {
        Self::with_bus(defaults, event_bus())
    }

    pub fn with_bus(defaults: Config, bus: &'static EventBus) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                objects: Vec::new(),
                promises: HashSet::new(),
                defaults,
            })),
            bus,
        }
    }

    pub fn bus(&self) -> &'static EventBus {
        self.bus
    }

    /// Copy of the application defaults
    pub fn defaults(&self) -> Config {
        self.inner.read().defaults.clone()
    }

    /// Edit the application defaults in place.
    pub fn update_defaults<R>(&self, f: impl FnOnce(&mut Config) -> R) -> R {
        f(&mut self.inner.write().defaults)
    }

    /// Reserve `name` for a document that is still being built.
    pub fn promise(&self, name: &str) -> AppResult<()> {
        {
            let mut inner = self.inner.write();
            if inner.find(name).is_some() || inner.promises.contains(name) {
                return Err(ProjectError::DuplicateName(name.to_string()).into());
            }
            inner.promises.insert(name.to_string());
        }
        debug!("Promised {}", name);
        self.bus.notify(AppEvent::Object(ObjectEvent::Promised {
            name: name.to_string(),
        }));
        Ok(())
    }

    /// Drop a promise without creating the document.
    pub fn retract(&self, name: &str) -> AppResult<()> {
        if !self.inner.write().promises.remove(name) {
            return Err(ProjectError::PromiseNotFound(name.to_string()).into());
        }
        debug!("Retracted {}", name);
        self.bus.notify(AppEvent::Object(ObjectEvent::Retracted {
            name: name.to_string(),
        }));
        Ok(())
    }

    pub fn is_promised(&self, name: &str) -> bool {
        self.inner.read().promises.contains(name)
    }

    pub fn has_promises(&self) -> bool {
        !self.inner.read().promises.is_empty()
    }

    /// Create a document of `kind` named `name`, fill it with `init` and add
    /// it to the project in the default units.
    ///
    /// A pending promise for `name` is resolved on success and retracted on
    /// failure. Failures are also published as [`ObjectEvent::Failed`].
    pub fn new_object<F>(&self, kind: ObjectKind, name: &str, init: F) -> AppResult<ObjectHandle>
    where
        F: FnOnce(&mut CamObject) -> CamResult<()>,
    {
        let (defaults, taken) = {
            let inner = self.inner.read();
            (inner.defaults.clone(), inner.find(name).is_some())
        };

        let result = if taken {
            Err(ProjectError::DuplicateName(name.to_string()).into())
        } else {
            self.build_object(kind, &defaults, init)
        };

        let object = match result {
            Ok(object) => object,
            Err(e) => {
                self.fail(name, &e);
                return Err(e);
            }
        };

        let handle = Arc::new(RwLock::new(object));
        let inserted = {
            let mut inner = self.inner.write();
            if inner.find(name).is_some() {
                false
            } else {
                inner.objects.push((name.to_string(), Arc::clone(&handle)));
                inner.promises.remove(name);
                true
            }
        };
        if !inserted {
            let e: AppError = ProjectError::DuplicateName(name.to_string()).into();
            self.fail(name, &e);
            return Err(e);
        }

        info!("Object {} ({}) created", name, kind);
        self.bus.notify(AppEvent::Object(ObjectEvent::Created {
            name: name.to_string(),
            kind: kind.to_string(),
        }));
        Ok(handle)
    }

    fn build_object<F>(&self, kind: ObjectKind, defaults: &Config, init: F) -> AppResult<CamObject>
    where
        F: FnOnce(&mut CamObject) -> CamResult<()>,
    {
        let mut object = CamObject::from_defaults(kind, defaults)?;
        init(&mut object)?;
        let units = defaults.general.units;
        if object.document().units() != units {
            let factor = object.convert_units(units);
            debug!("Converted to {} (factor {})", units, factor);
        }
        Ok(object)
    }

    fn fail(&self, name: &str, error: &AppError) {
        warn!("Object {} failed: {}", name, error);
        if self.inner.write().promises.remove(name) {
            self.bus.notify(AppEvent::Object(ObjectEvent::Retracted {
                name: name.to_string(),
            }));
        }
        self.bus.notify(AppEvent::Object(ObjectEvent::Failed {
            name: name.to_string(),
            reason: error.to_string(),
        }));
    }

    /// Promise `name` and build the document on the least-loaded worker.
    /// Returns the worker index.
    pub fn spawn_object<F>(&self, workers: &WorkerStack, kind: ObjectKind, name: &str, init: F) -> AppResult<usize>
    where
        F: FnOnce(&mut CamObject, &TaskContext) -> CamResult<()> + Send + 'static,
    {
        self.promise(name)?;
        let project = self.clone();
        let object_name = name.to_string();
        let queued = workers.add_task(format!("new_object {}", name), move |ctx| {
            let built = catch_unwind(AssertUnwindSafe(|| {
                project.new_object(kind, &object_name, |object| init(object, ctx))
            }));
            match built {
                Ok(result) => result
                    .map(|_| ())
                    .map_err(|e| pcbcam_core::Error::other(e.to_string())),
                Err(_) => {
                    // The panic skipped new_object's own cleanup.
                    let reason = format!("building {} panicked", object_name);
                    project.fail(&object_name, &AppError::Core(pcbcam_core::Error::other(reason.clone())));
                    Err(pcbcam_core::Error::other(reason))
                }
            }
        });
        match queued {
            Ok(worker) => Ok(worker),
            Err(e) => {
                let e = AppError::from(e);
                self.fail(name, &e);
                Err(e)
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<ObjectHandle> {
        self.inner.read().find(name).cloned()
    }

    /// Like [`Project::get`], failing with [`ProjectError::ObjectNotFound`].
    pub fn require(&self, name: &str) -> AppResult<ObjectHandle> {
        self.get(name)
            .ok_or_else(|| ProjectError::ObjectNotFound(name.to_string()).into())
    }

    /// Object names in creation order
    pub fn names(&self) -> Vec<String> {
        self.inner.read().objects.iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn remove(&self, name: &str) -> AppResult<ObjectHandle> {
        let handle = {
            let mut inner = self.inner.write();
            let index = inner
                .objects
                .iter()
                .position(|(n, _)| n == name)
                .ok_or_else(|| ProjectError::ObjectNotFound(name.to_string()))?;
            inner.objects.remove(index).1
        };
        self.bus.notify(AppEvent::Object(ObjectEvent::Deleted {
            name: name.to_string(),
        }));
        Ok(handle)
    }

    /// Write the defaults and every document to a JSON project file.
    pub fn save(&self, path: &Path) -> AppResult<()> {
        let file = {
            let inner = self.inner.read();
            ProjectFile {
                version: crate::VERSION.to_string(),
                defaults: inner.defaults.clone(),
                objects: inner
                    .objects
                    .iter()
                    .map(|(name, handle)| SavedObject {
                        name: name.clone(),
                        object: handle.read().clone(),
                    })
                    .collect(),
            }
        };
        std::fs::write(path, serde_json::to_string(&file)?)?;
        info!("Saved {} objects to {}", file.objects.len(), path.display());
        Ok(())
    }

    /// Replace the project contents with those of a saved project file.
    pub fn open(&self, path: &Path) -> AppResult<()> {
        let file: ProjectFile = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        file.defaults.validate()?;
        if file.version != crate::VERSION {
            debug!("Project written by version {}", file.version);
        }

        let mut seen = HashSet::new();
        for saved in &file.objects {
            if !seen.insert(saved.name.as_str()) {
                return Err(ProjectError::DuplicateName(saved.name.clone()).into());
            }
        }

        let (removed, created) = {
            let mut inner = self.inner.write();
            let removed: Vec<String> = inner.objects.drain(..).map(|(n, _)| n).collect();
            inner.defaults = file.defaults;
            inner.objects = file
                .objects
                .into_iter()
                .map(|saved| (saved.name, Arc::new(RwLock::new(saved.object))))
                .collect();
            let created: Vec<(String, ObjectKind)> = inner
                .objects
                .iter()
                .map(|(n, h)| (n.clone(), h.read().kind()))
                .collect();
            (removed, created)
        };

        for name in removed {
            self.bus.notify(AppEvent::Object(ObjectEvent::Deleted { name }));
        }
        for (name, kind) in &created {
            self.bus.notify(AppEvent::Object(ObjectEvent::Created {
                name: name.clone(),
                kind: kind.to_string(),
            }));
        }
        info!("Opened {} with {} objects", path.display(), created.len());
        Ok(())
    }
}

impl fmt::Debug for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("Project")
            .field("objects", &inner.objects.len())
            .field("promises", &inner.promises.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pcbcam_camlib::Geom;
    use pcbcam_core::EventBus;

    fn project() -> Project {
        Project::with_bus(Config::default(), Box::leak(Box::new(EventBus::new())))
    }

    #[test]
    fn test_options_follow_defaults() {
        let mut defaults = Config::default();
        defaults.gerber.isotooldia = 0.02;
        defaults.gerber.gaps = "4".to_string();
        defaults.excellon.zeros = "T".to_string();

        let gerber = CamObject::from_defaults(ObjectKind::Gerber, &defaults).unwrap();
        assert_eq!(gerber.get_option("isotooldia"), Some(serde_json::json!(0.02)));
        assert_eq!(gerber.get_option("gaps"), Some(serde_json::json!("4")));

        let excellon = CamObject::from_defaults(ObjectKind::Excellon, &defaults).unwrap();
        let (doc, _) = excellon.excellon("drl").unwrap();
        assert_eq!(doc.zeros, Zeros::T);
    }

    #[test]
    fn test_new_object_converts_to_default_units() {
        let project = project();
        let handle = project
            .new_object(ObjectKind::Geometry, "g", |object| {
                let document = object.document_mut();
                document.set_units(Units::Mm);
                Ok(())
            })
            .unwrap();
        // Defaults are in inches; mm lengths shrink by 25.4.
        let object = handle.read();
        assert_eq!(object.document().units(), Units::In);
        let (_, options) = object.geometry("g").unwrap();
        assert!((options.cutz - GeometryOptions::default().cutz / 25.4).abs() < 1e-12);
    }

    #[test]
    fn test_kind_mismatch() {
        let project = project();
        let handle = project.new_object(ObjectKind::CncJob, "job", |_| Ok(())).unwrap();
        let object = handle.read();
        assert!(matches!(
            object.gerber("job"),
            Err(ProjectError::KindMismatch { ref actual, .. }) if actual == "cncjob"
        ));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let project = project();
        project.new_object(ObjectKind::Geometry, "a", |_| Ok(())).unwrap();
        assert!(project.promise("a").is_err());
        assert!(project.new_object(ObjectKind::Geometry, "a", |_| Ok(())).is_err());
        assert_eq!(project.len(), 1);
    }

    #[test]
    fn test_remove() {
        let project = project();
        project
            .new_object(ObjectKind::Geometry, "a", |object| {
                if let CamObject::Geometry { document, .. } = object {
                    document.solid_geometry = Geom::Point(geo::Point::new(1.0, 2.0));
                }
                Ok(())
            })
            .unwrap();
        let removed = project.remove("a").unwrap();
        assert!(matches!(removed.read().document().solid_geometry(), Geom::Point(_)));
        assert!(project.is_empty());
        assert!(project.remove("a").is_err());
    }
}
