use crate::{DocumentSource, ExtractError};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        if is_pdf(entry.path()) {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

/// Expands folders into the PDFs beneath them. Any other path is passed
/// through; if it cannot be read, that document's entry records the error.
pub fn collect_sources(paths: &[PathBuf]) -> Result<Vec<DocumentSource>, ExtractError> {
    if paths.is_empty() {
        return Err(ExtractError::InvalidArgument(
            "no input paths given".to_string(),
        ));
    }

    let mut sources = Vec::new();
    for path in paths {
        if path.is_dir() {
            let files = discover_pdf_files(path);
            if files.is_empty() {
                return Err(ExtractError::InvalidArgument(format!(
                    "no pdf files found in {}",
                    path.display()
                )));
            }
            debug!(folder = %path.display(), files = files.len(), "discovered pdf files");
            sources.extend(files.into_iter().map(DocumentSource::Path));
        } else {
            sources.push(DocumentSource::from_path(path.clone()));
        }
    }

    Ok(sources)
}

#[cfg(test)]
mod tests {
    use super::{collect_sources, discover_pdf_files};
    use crate::ExtractError;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn discover_pdf_files_is_recursive() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let base = dir.path();
        let nested = base.join("nested");
        fs::create_dir(&nested)?;

        File::create(base.join("a.pdf")).and_then(|mut file| file.write_all(b"%PDF-1.4\n%fake"))?;
        File::create(nested.join("b.PDF"))
            .and_then(|mut file| file.write_all(b"%PDF-1.4\n%fake"))?;
        fs::write(base.join("notes.txt"), b"not a tender")?;

        let files = discover_pdf_files(base);
        assert_eq!(files, vec![base.join("a.pdf"), nested.join("b.PDF")]);
        Ok(())
    }

    #[test]
    fn folders_expand_and_files_pass_through() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let folder = dir.path().join("batch");
        fs::create_dir(&folder)?;
        fs::write(folder.join("two.pdf"), b"%PDF-1.4")?;
        fs::write(folder.join("one.pdf"), b"%PDF-1.4")?;
        let single = dir.path().join("single.pdf");
        fs::write(&single, b"%PDF-1.4")?;

        let sources = collect_sources(&[single.clone(), folder])?;
        let names: Vec<_> = sources.iter().map(|source| source.name()).collect();
        assert_eq!(names, vec!["single.pdf", "one.pdf", "two.pdf"]);
        Ok(())
    }

    #[test]
    fn empty_folder_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let result = collect_sources(&[dir.path().to_path_buf()]);
        assert!(matches!(result, Err(ExtractError::InvalidArgument(_))));
        Ok(())
    }

    #[test]
    fn missing_file_is_passed_through() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let good = dir.path().join("good.pdf");
        fs::write(&good, b"%PDF-1.4")?;
        let gone = dir.path().join("gone.pdf");

        let sources = collect_sources(&[good, gone.clone()])?;
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[1].path(), Some(gone.as_path()));
        Ok(())
    }

    #[test]
    fn no_paths_is_rejected() {
        assert!(matches!(
            collect_sources(&[]),
            Err(ExtractError::InvalidArgument(_))
        ));
    }
}
