use crate::schema::{ACTIVITY_COLUMNS, PLAY_ACTION};
use common::Result;
use datafusion::prelude::*;

/// Renames raw log fields to activity columns, dropping fields nothing downstream reads.
pub fn normalize_activity(raw: DataFrame) -> Result<DataFrame> {
    let select_exprs: Vec<Expr> = ACTIVITY_COLUMNS
        .iter()
        // raw names are camelCase; `col` would fold them to lower case
        .map(|(raw_name, name)| ident(*raw_name).alias(*name))
        .collect();

    Ok(raw.select(select_exprs)?)
}

/// Keeps only play actions; every other builder on the log side reads from this.
pub fn filter_play_actions(activity: DataFrame) -> Result<DataFrame> {
    Ok(activity.filter(col("page").eq(lit(PLAY_ACTION)))?)
}
