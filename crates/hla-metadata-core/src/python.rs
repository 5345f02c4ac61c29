//! Python bindings over the versioned lookup API.

use std::path::PathBuf;

use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList};
use pyo3::wrap_pyfunction;

use crate::config::DictionaryConfig;
use crate::dictionary::MetadataDictionary;
use crate::models::{Locus, MatchingDictionaryEntry};

fn entry_to_dict<'py>(
    py: Python<'py>,
    entry: &MatchingDictionaryEntry,
) -> PyResult<Bound<'py, PyDict>> {
    let dict = PyDict::new(py);
    dict.set_item("locus", entry.locus.as_str())?;
    dict.set_item("lookup_name", &entry.lookup_name)?;
    dict.set_item("typing_method", format!("{:?}", entry.typing_method))?;
    dict.set_item(
        "matching_p_groups",
        entry.matching_p_groups.iter().cloned().collect::<Vec<_>>(),
    )?;
    dict.set_item(
        "matching_g_groups",
        entry.matching_g_groups.iter().cloned().collect::<Vec<_>>(),
    )?;
    let serologies = PyList::empty(py);
    for serology in &entry.matching_serologies {
        let item = PyDict::new(py);
        item.set_item("name", &serology.name)?;
        item.set_item("is_direct_mapping", serology.is_direct_mapping)?;
        item.set_item("tier", serology.tier.map(|tier| format!("{tier:?}")))?;
        serologies.append(item)?;
    }
    dict.set_item("matching_serologies", serologies)?;
    Ok(dict)
}

#[pyfunction(name = "classify")]
fn py_classify(typing: &str) -> PyResult<String> {
    Ok(crate::typing::classify(typing)?.as_str().to_string())
}

#[pyclass(name = "MetadataDictionary")]
pub struct PyMetadataDictionary {
    inner: MetadataDictionary,
}

#[pymethods]
impl PyMetadataDictionary {
    #[new]
    #[pyo3(signature = (data_root, max_cached_versions=16, include_confidential=false))]
    fn new(data_root: PathBuf, max_cached_versions: usize, include_confidential: bool) -> Self {
        let config = DictionaryConfig {
            data_root,
            max_cached_versions,
            include_confidential,
            ..DictionaryConfig::default()
        };
        Self {
            inner: MetadataDictionary::from_config(config),
        }
    }

    fn lookup<'py>(
        &self,
        py: Python<'py>,
        version: &str,
        locus: &str,
        typing: &str,
    ) -> PyResult<Option<Bound<'py, PyDict>>> {
        let locus: Locus = locus.parse()?;
        let entry = py.allow_threads(|| self.inner.lookup(version, locus, typing))?;
        entry.map(|entry| entry_to_dict(py, &entry)).transpose()
    }

    fn expand_ambiguous_typing(
        &self,
        py: Python<'_>,
        version: &str,
        locus: &str,
        typing: &str,
    ) -> PyResult<Vec<String>> {
        let locus: Locus = locus.parse()?;
        Ok(py.allow_threads(|| self.inner.expand_ambiguous_typing(version, locus, typing))?)
    }

    fn convert_to_p_group(
        &self,
        py: Python<'_>,
        version: &str,
        locus: &str,
        typing: &str,
    ) -> PyResult<Option<String>> {
        let locus: Locus = locus.parse()?;
        let index = py.allow_threads(|| self.inner.build_or_get_index(version))?;
        Ok(index.convert_to_p_group(locus, typing)?)
    }

    fn convert_to_g_group(
        &self,
        py: Python<'_>,
        version: &str,
        locus: &str,
        typing: &str,
    ) -> PyResult<Option<String>> {
        let locus: Locus = locus.parse()?;
        let index = py.allow_threads(|| self.inner.build_or_get_index(version))?;
        Ok(index.convert_to_g_group(locus, typing)?)
    }

    fn available_versions(&self) -> PyResult<Vec<String>> {
        Ok(self.inner.available_versions()?)
    }
}

#[pymodule]
fn hla_metadata_core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyMetadataDictionary>()?;
    m.add_function(wrap_pyfunction!(py_classify, m)?)?;
    Ok(())
}
