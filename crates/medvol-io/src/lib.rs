pub mod format;
pub mod nifti_io;
pub mod nrrd_io;

pub use format::{codec_for_path, load, save, save_with_config, Format};
pub use nifti_io::NiftiCodec;
pub use nrrd_io::{NrrdCodec, NrrdEncoding};
