//! Predefined browser profiles.

pub mod chrome;

pub use chrome::Chrome;
