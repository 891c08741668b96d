pub mod codec;
pub mod model;

pub use codec::{compress, decode, encode, encode_raw, is_gzip};
pub use model::{
    Frame, FunctionDescriptor, FunctionId, LocationDescriptor, LocationId, ProfileData,
    ProfileSummary, SampleRecord, SampleType,
};
