/*!
# Team Dashboard

Password-protected dashboards over athlete tracking data, served to the
browser by a small Rust web server.

## Overview

Each team logs in and sees its own tracking export (speed, power and heart
rate per player and session). The sidebar narrows the data with linked
multi-select filters; the tabs render charts of the filtered rows, and the
raw rows can be downloaded as CSV or XLSX.

## Architecture

### Frontend Layer
- **Technologies**: HTML, CSS, vega-embed
- **Key Components**:
  - Login page - Username/password form
  - Dashboard page - Filter sidebar, Speed/Power/Conditioning/Raw tabs
  - Explore page - Raw data and a histogram of one column

### Backend Layer
- **Technologies**: Rust, axum
- **Core Components**:
  - Loader - CSV and spreadsheet files, remote spreadsheet exports
  - Dataset preparation - Date parsing, then the derived `HRper` column
  - Dynamic filters - AND of every active selection
  - Chart builder - Vega-Lite specs with the filtered rows inline
  - Authentication - Plaintext secrets or argon2/bcrypt hashed credentials
  - Session store - Signed cookies mapped to server-side sessions

## Modules

- **cell**: Cell values (empty, number, text, date)
- **table**: Column-named tables and the prepared `Dataset`
- **metrics**: `HRper` derivation and histograms
- **filter**: Linked multi-select filters
- **charts**: Vega-Lite chart specs per dashboard tab
- **config**: Secrets, authenticator config and runtime settings
- **loader**: CSV, Excel/ODS and remote loading
- **login**: Authentication and session management
- **downloader**: Export functionality (CSV, XLSX)
- **cache**: TTL cache of loaded data
- **app**: Routing and middleware

## REST API Endpoints

- `GET|POST /login`, `GET|POST /logout` - Session handling
- `POST /api/dashboard` - Filter widgets and chart tabs for a selection
- `GET /api/explore` - Raw data and histogram of the explore file
- `POST /api/download/csv`, `POST /api/download/xlsx` - Filtered rows
- `POST /api/refresh` - Drop the team's cached data
*/

pub mod cell;
pub mod charts;
pub mod config;
pub mod downloader;
pub mod error;
pub mod filter;
pub mod loader;
pub mod login;
pub mod metrics;
pub mod table;

#[cfg(feature = "web")]
pub mod app;
#[cfg(feature = "web")]
pub mod cache;

pub use cell::Cell;
pub use error::{DashboardError, Result};
pub use filter::DynamicFilters;
pub use table::{Dataset, Table};
