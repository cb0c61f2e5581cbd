use crate::{Value, ValueError};

/// Options controlling [`deep_merge`].
#[derive(Clone, Copy, Debug, Default)]
pub struct MergeOptions {
  /// Refuse overlay keys that are absent from the destination map.
  pub strict: bool,
}

/// Deep-merges `overlay` into `base`.
///
/// Maps merge key-wise with the overlay winning on leaf conflicts; sequences
/// and scalars are replaced wholesale. An overlay `Missing` never clobbers a
/// concrete value already in place.
pub fn deep_merge(base: &mut Value, overlay: Value, opts: MergeOptions) -> Result<(), ValueError> {
  match (base, overlay) {
    (Value::Map(base_map), Value::Map(overlay_map)) => {
      for (key, overlay_val) in overlay_map {
        match base_map.get_mut(&key) {
          Some(base_val) => deep_merge(base_val, overlay_val, opts)?,
          None => {
            if opts.strict {
              return Err(ValueError::StrictMode { key });
            }
            base_map.insert(key, overlay_val);
          }
        }
      }
      Ok(())
    }
    (_, Value::Missing) => Ok(()),
    (base, overlay) => {
      *base = overlay;
      Ok(())
    }
  }
}
