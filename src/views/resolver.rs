use crate::config::ViewConfig;
use crate::error::{Error, Result};
use crate::security::validate_view_name;
use std::path::{Path, PathBuf};

/// Maps dotted logical view names to files across ordered search roots
///
/// Roots are searched in order: the core view directory, the project view
/// directory, then every `<packages>/<package>/Views` directory sorted by
/// package name. The first existing file wins.
#[derive(Debug, Clone)]
pub struct ViewResolver {
    roots: Vec<PathBuf>,
    extension: String,
}

impl ViewResolver {
    pub fn new(roots: Vec<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            roots,
            extension: extension.into().trim_start_matches('.').to_string(),
        }
    }

    /// Single-root resolver using the default `.squehub.html` extension
    pub fn single<P: AsRef<Path>>(root: P) -> Self {
        Self::new(vec![root.as_ref().to_path_buf()], "squehub.html")
    }

    pub fn from_config(config: &ViewConfig) -> Self {
        let mut roots = vec![PathBuf::from(&config.directory)];

        if let Some(project) = &config.project_directory {
            let path = PathBuf::from(project);
            if path.is_dir() {
                roots.push(path);
            }
        }

        if let Some(packages) = &config.packages_directory {
            roots.extend(discover_package_roots(Path::new(packages)));
        }

        log::debug!("View search roots: {:?}", roots);
        Self::new(roots, config.extension.clone())
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Relative file path for a logical name: dots become path separators
    fn relative_path(&self, name: &str) -> PathBuf {
        let mut path: PathBuf = name.split(['.', '/']).collect();
        let file_name = format!(
            "{}.{}",
            path.file_name().and_then(|f| f.to_str()).unwrap_or(name),
            self.extension
        );
        path.set_file_name(file_name);
        path
    }

    /// Find the file for `name`, or `Error::ViewNotFound`
    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        validate_view_name(name)?;
        let relative = self.relative_path(name);

        self.roots
            .iter()
            .map(|root| root.join(&relative))
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| Error::view_not_found(name))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.resolve(name).is_ok()
    }

    /// Where `name` would live in the first root, for error messages
    pub fn expected_path(&self, name: &str) -> PathBuf {
        let relative = self.relative_path(name);
        match self.roots.first() {
            Some(root) => root.join(relative),
            None => relative,
        }
    }
}

/// `<packages>/*/Views` directories, sorted by package name
fn discover_package_roots(packages: &Path) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(packages) {
        Ok(entries) => entries,
        Err(e) => {
            log::debug!("No package views under {}: {}", packages.display(), e);
            return Vec::new();
        }
    };

    let mut roots: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path().join("Views"))
        .filter(|path| path.is_dir())
        .collect();
    roots.sort();
    roots
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_dots_map_to_directories() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("users")).unwrap();
        fs::write(temp_dir.path().join("users/profile.squehub.html"), "x").unwrap();

        let resolver = ViewResolver::single(temp_dir.path());
        let path = resolver.resolve("users.profile").unwrap();
        assert!(path.ends_with("users/profile.squehub.html"));
    }

    #[test]
    fn test_first_root_wins() {
        let core = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        fs::write(core.path().join("home.squehub.html"), "core").unwrap();
        fs::write(project.path().join("home.squehub.html"), "project").unwrap();
        fs::write(project.path().join("about.squehub.html"), "about").unwrap();

        let resolver = ViewResolver::new(
            vec![core.path().to_path_buf(), project.path().to_path_buf()],
            "squehub.html",
        );
        assert!(resolver.resolve("home").unwrap().starts_with(core.path()));
        assert!(resolver.resolve("about").unwrap().starts_with(project.path()));
    }

    #[test]
    fn test_package_roots_are_discovered() {
        let base = TempDir::new().unwrap();
        let views = base.path().join("views");
        let packages = base.path().join("packages");
        fs::create_dir_all(&views).unwrap();
        fs::create_dir_all(packages.join("blog/Views")).unwrap();
        fs::create_dir_all(packages.join("shop/Views")).unwrap();
        fs::create_dir_all(packages.join("empty")).unwrap();
        fs::write(packages.join("shop/Views/cart.squehub.html"), "cart").unwrap();

        let config = ViewConfig {
            directory: views.to_string_lossy().into_owned(),
            packages_directory: Some(packages.to_string_lossy().into_owned()),
            ..ViewConfig::default()
        };
        let resolver = ViewResolver::from_config(&config);
        assert_eq!(resolver.roots().len(), 3);
        assert!(resolver.exists("cart"));
    }

    #[test]
    fn test_missing_and_invalid_names() {
        let temp_dir = TempDir::new().unwrap();
        let resolver = ViewResolver::single(temp_dir.path());

        assert!(matches!(resolver.resolve("missing"), Err(Error::ViewNotFound(_))));
        assert!(resolver.resolve("../secret").is_err());
        assert!(resolver.resolve("a..b").is_err());
        assert!(resolver
            .expected_path("pages.home")
            .ends_with("pages/home.squehub.html"));
    }
}
