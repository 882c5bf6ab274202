/// Format conversions for the GEOGLOWS streamflow service.
///
/// Everything between "the data service answered" and "the caller gets
/// JSON text" lives here. No network, no protocol types.
///
/// Submodules:
/// - `dates`: parses the date bounds tool callers pass in.
/// - `records`: turns frames and return-period tables into JSON.

pub mod dates;
pub mod records;
