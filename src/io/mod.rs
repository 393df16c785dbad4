//! Reading and writing of xctask binary and YAML files.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use anyhow::{self, format_err};
use serde::{de::DeserializeOwned, Serialize};

pub(crate) mod format;


/// The binary artefacts exchanged between xctask runs. Each kind has its own double extension
/// so that a partitioning, a density and a result can share one stem.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum XcTaskFileType {
    /// A [`crate::drivers::grid_partitioning::GridPartitioningResult`], or reference task lists.
    Tsk,

    /// A dense matrix such as a density matrix.
    Mat,

    /// A [`crate::drivers::xc_integration::XcIntegrationResult`].
    Int,
}

impl XcTaskFileType {
    pub fn ext(&self) -> String {
        match self {
            XcTaskFileType::Tsk => "xctask.tsk",
            XcTaskFileType::Mat => "xctask.mat",
            XcTaskFileType::Int => "xctask.int",
        }
        .to_string()
    }

    /// `name` with any existing extension replaced by [`Self::ext`].
    pub fn path_for<P: AsRef<Path>>(&self, name: P) -> PathBuf {
        name.as_ref().with_extension(self.ext())
    }
}

/// Deserialises `T` from the `bincode` file of kind `file_type` stored under the stem `name`.
///
/// # Errors
///
/// Errors if the file cannot be opened or does not hold a `T`.
pub fn read_xctask_binary<T, P: AsRef<Path>>(
    name: P,
    file_type: XcTaskFileType,
) -> Result<T, anyhow::Error>
where
    T: DeserializeOwned,
{
    let path = file_type.path_for(name);
    let file = File::open(&path).map_err(|err| format_err!("{}: {err}", path.display()))?;
    bincode::deserialize_from(BufReader::new(file))
        .map_err(|err| format_err!("{}: {err}", path.display()))
}

/// Serialises `value` with `bincode` to the file of kind `file_type` under the stem `name`,
/// replacing any previous content.
///
/// # Errors
///
/// Errors if the file cannot be created or written.
pub fn write_xctask_binary<T, P: AsRef<Path>>(
    name: P,
    file_type: XcTaskFileType,
    value: &T,
) -> Result<(), anyhow::Error>
where
    T: Serialize,
{
    let path = file_type.path_for(name);
    let file = File::create(&path).map_err(|err| format_err!("{}: {err}", path.display()))?;
    bincode::serialize_into(BufWriter::new(file), value).map_err(|err| format_err!(err))
}

/// Deserialises `T` from the YAML file at `name`, which is used as given.
///
/// # Errors
///
/// Errors if the file cannot be opened or its content does not describe a `T`.
pub fn read_xctask_yaml<T, P: AsRef<Path>>(name: P) -> Result<T, anyhow::Error>
where
    T: DeserializeOwned,
{
    let file = File::open(name.as_ref())
        .map_err(|err| format_err!("{}: {err}", name.as_ref().display()))?;
    serde_yaml::from_reader(BufReader::new(file)).map_err(|err| format_err!(err))
}

/// Serialises `value` as YAML to `name` with its extension set to `yml`.
///
/// # Errors
///
/// Errors if the file cannot be created or written.
pub fn write_xctask_yaml<T, P: AsRef<Path>>(name: P, value: &T) -> Result<(), anyhow::Error>
where
    T: Serialize,
{
    let file = File::create(name.as_ref().with_extension("yml"))?;
    serde_yaml::to_writer(BufWriter::new(file), value).map_err(|err| format_err!(err))
}
