mod client;

pub use client::{
    ApiErrorClass, DiskInfo, OperationStatus, Resource, ResourceList, ResourceType, TransferLink,
    YadiskClient, YadiskError,
};
