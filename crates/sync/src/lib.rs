//! Keeps a live map consistent with the remote recipient dataset.
//!
//! [`store::RecipientStore`] holds the last good snapshot of recipients and
//! reference tables and refreshes it atomically. [`reconciler::MarkerReconciler`]
//! diffs a record set against the markers it owns and issues the minimal
//! add/update/remove calls on a [`surface::MapSurface`].

pub mod reconciler;
pub mod store;
pub mod surface;
