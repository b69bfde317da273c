use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// The current working directory, for rendering user-facing paths.
static CWD: LazyLock<PathBuf> =
    LazyLock::new(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

pub trait Simplified {
    /// Simplify a [`Path`].
    ///
    /// On Windows, this will strip the `\\?\` prefix from paths. On other platforms, it's a no-op.
    fn simplified(&self) -> &Path;

    /// Render a [`Path`] for user-facing display.
    ///
    /// On Windows, this will strip the `\\?\` prefix from paths. On other platforms, it's
    /// equivalent to [`std::path::Display`].
    fn simplified_display(&self) -> std::path::Display<'_>;

    /// Render a [`Path`] for user-facing display, relative to the current working directory when
    /// it is inside of it.
    fn user_display(&self) -> std::path::Display<'_>;
}

impl<T: AsRef<Path>> Simplified for T {
    fn simplified(&self) -> &Path {
        dunce::simplified(self.as_ref())
    }

    fn simplified_display(&self) -> std::path::Display<'_> {
        dunce::simplified(self.as_ref()).display()
    }

    fn user_display(&self) -> std::path::Display<'_> {
        let path = dunce::simplified(self.as_ref());

        // If the path is the working directory itself, show it in full.
        if CWD.as_path() == path {
            return path.display();
        }

        path.strip_prefix(CWD.simplified()).unwrap_or(path).display()
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::Simplified;

    #[test]
    fn user_display_strips_working_directory() {
        let cwd = std::env::current_dir().unwrap();
        let path = cwd.join("tether.lock");
        assert_eq!(path.user_display().to_string(), "tether.lock");
        assert_eq!(
            Path::new("/elsewhere/tether.lock").user_display().to_string(),
            "/elsewhere/tether.lock"
        );
    }
}
